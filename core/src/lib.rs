pub mod control;
pub mod error;
pub mod message;
pub mod params;
pub mod pipe;
pub mod types;

/// Shorthand macro to return a new [`TypedError`](crate::error::TypedError)
///
/// Allows expressing
///
/// ```no_run
/// # use anyhow::anyhow;
/// # use nexus_core::error::{TypedError, TypedResult, SystemError};
/// # fn main() -> TypedResult<()>{
/// let offender = "bad construct";
/// let problem = anyhow!("a {offender} description");
/// return Err(TypedError::new(SystemError::Lowering, problem));
/// # }
/// ```
///
/// as a more compact
///
/// ```no_run
/// # use nexus_core::error::TypedResult;
/// # use nexus_core::problem;
/// # fn main() -> TypedResult<()>{
/// # let offender = "bad construct";
/// problem!(Lowering, "a {offender} description");
/// # }
/// ```
#[macro_export]
macro_rules! problem {
    ($typed_err: expr, $($tail:tt)*) => {{
        #[allow(unused_imports)]
        use $crate::error::SystemError::*;
        let problem = ::anyhow::anyhow!($($tail)*);
        return $crate::error::TypedResult::Err(
            $crate::error::TypedError::new($typed_err, problem)
        );
    }};
}
