//! ESB Core: message exchange model, interceptor and endpoint contracts, hints.

pub mod error;
pub mod exchange;
pub mod hint;
pub mod traits;
pub mod types;

pub use error::ProcessingError;
pub use exchange::{
    Exchange, ExchangeError, ExchangeFault, ExchangeId, ExchangeStatus, NormalizedMessage,
    Pattern, Role, ServiceTarget,
};
pub use hint::Hint;
pub use traits::{interceptor_types, keys, Interceptor, ServiceEndpoint};
pub use types::{properties, Properties, Value};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
