//! The 2-D grid of nodes and its per-column aggregators
//!
//! Construction wires every node's outbound pipes to the matching inbound
//! pipes of its neighbours (boundary directions stay unconnected), hangs one
//! aggregator under the south edge of each column, and chains the aggregators
//! westward so column zero drains towards the host.
use nexus_core::params::AGGREGATOR_SLOTS;
use nexus_core::types::{Direction, NodeId};

use crate::aggregator::Aggregator;
use crate::node::Node;
use crate::PipeHandle;

pub struct Mesh {
    rows: u32,
    columns: u32,
    nodes: Vec<Vec<Node>>,
    aggregators: Vec<Aggregator>,
}

impl Mesh {
    pub fn new(rows: u32, columns: u32) -> Self {
        assert!(rows > 0 && columns > 0, "mesh dimensions must be non-zero");
        let mut nodes: Vec<Vec<Node>> = (0..rows)
            .map(|row| {
                (0..columns)
                    .map(|column| Node::new(NodeId::new(row as u8, column as u8)))
                    .collect()
            })
            .collect();

        // Gather the neighbour attachments first, then apply them; a node's
        // outbound pipe in some direction is the facing inbound pipe of the
        // node it points at
        let mut links: Vec<(usize, usize, Direction, PipeHandle)> = Vec::new();
        for row in 0..rows as usize {
            for column in 0..columns as usize {
                if row > 0 {
                    links.push((
                        row,
                        column,
                        Direction::North,
                        nodes[row - 1][column].inbound_pipe(Direction::South),
                    ));
                }
                if row < rows as usize - 1 {
                    links.push((
                        row,
                        column,
                        Direction::South,
                        nodes[row + 1][column].inbound_pipe(Direction::North),
                    ));
                }
                if column > 0 {
                    links.push((
                        row,
                        column,
                        Direction::West,
                        nodes[row][column - 1].inbound_pipe(Direction::East),
                    ));
                }
                if column < columns as usize - 1 {
                    links.push((
                        row,
                        column,
                        Direction::East,
                        nodes[row][column + 1].inbound_pipe(Direction::West),
                    ));
                }
            }
        }
        for (row, column, dirx, pipe) in links {
            nodes[row][column].attach(dirx, pipe);
        }

        // One aggregator per column below the south edge, chained westward
        let mut aggregators: Vec<Aggregator> = (0..columns)
            .map(|column| Aggregator::new(NodeId::new(rows as u8, column as u8)))
            .collect();
        for column in 0..columns as usize {
            nodes[rows as usize - 1][column]
                .attach(Direction::South, aggregators[column].pipe_mesh());
            if column > 0 {
                let west = aggregators[column - 1].pipe_neighbour();
                aggregators[column].attach(west);
            }
        }

        Self {
            rows,
            columns,
            nodes,
            aggregators,
        }
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn node(&self, row: u32, column: u32) -> &Node {
        assert!(row < self.rows && column < self.columns);
        &self.nodes[row as usize][column as usize]
    }

    pub fn node_mut(&mut self, row: u32, column: u32) -> &mut Node {
        assert!(row < self.rows && column < self.columns);
        &mut self.nodes[row as usize][column as usize]
    }

    pub fn aggregator(&self, column: u32) -> &Aggregator {
        &self.aggregators[column as usize]
    }

    pub fn aggregator_mut(&mut self, column: u32) -> &mut Aggregator {
        &mut self.aggregators[column as usize]
    }

    /// Reset every node and aggregator, draining all pipes
    pub fn reset(&mut self) {
        for row in self.nodes.iter_mut() {
            for node in row.iter_mut() {
                node.reset();
            }
        }
        for aggregator in self.aggregators.iter_mut() {
            aggregator.reset();
        }
    }

    /// Step every node, then every aggregator, in a fixed order
    pub fn step(&mut self, trigger: bool) {
        for row in self.nodes.iter_mut() {
            for node in row.iter_mut() {
                node.step(trigger);
            }
        }
        for aggregator in self.aggregators.iter_mut() {
            aggregator.step();
        }
    }

    pub fn is_idle(&self) -> bool {
        for row in &self.nodes {
            for node in row {
                if !node.is_idle() {
                    trace!(
                        "Node {}, {} is still busy",
                        node.id().row,
                        node.id().column
                    );
                    return false;
                }
            }
        }
        self.aggregators.iter().all(Aggregator::is_idle)
    }

    /// Copy the per-column aggregator slots into `buf`
    pub fn get_outputs(&self, buf: &mut [u8]) {
        assert!(buf.len() >= (self.columns as usize) * AGGREGATOR_SLOTS);
        for column in 0..self.columns as usize {
            let slots = self.aggregators[column].outputs();
            buf[column * AGGREGATOR_SLOTS..(column + 1) * AGGREGATOR_SLOTS]
                .copy_from_slice(slots);
        }
    }

    /// Size of the buffer `get_outputs` fills
    pub fn output_len(&self) -> usize {
        self.columns as usize * AGGREGATOR_SLOTS
    }
}
