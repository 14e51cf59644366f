//! Small helpers shared by providers.
//!
//! ```
//! use skein::util::validate_feed_url;
//!
//! assert!(validate_feed_url("https://example.com/feed.xml", false).is_ok());
//! assert!(validate_feed_url("http://192.168.1.1/feed", false).is_err());
//! ```

mod url_validator;

pub use url_validator::{validate_feed_url, UrlValidationError};
