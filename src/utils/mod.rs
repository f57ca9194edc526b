pub mod url_validation;
pub mod wait;

pub use url_validation::{EndpointKind, UrlValidationError, validate_endpoint_url};
pub use wait::{WaitTimeout, wait_until};
