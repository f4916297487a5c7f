#[cfg(feature = "browser")]
pub mod browser;
pub mod extract;
pub mod identities;
pub mod sender;
pub mod sources;

#[cfg(feature = "browser")]
pub use browser::BrowserRenderer;
pub use extract::{ExtractorConfig, FieldMap, HtmlExtractor, JsonApiExtractor, RssExtractor};
pub use identities::default_identities;
pub use sender::ReqwestSender;
pub use sources::SourcesFile;
