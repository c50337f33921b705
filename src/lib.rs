pub mod config;
pub mod dict;
pub mod lookup;
pub mod resolve;
pub mod rewrite;
pub mod substitute;
pub mod template;
pub mod web;

pub use config::{ConfigError, ConflictAction, DictGroup, SaveFormat, Settings, SubstituteRule};
pub use dict::{DictError, DictionaryReader, MdictReader};
pub use lookup::{LookupOutcome, LookupRequest, RenderError, lookup_all};
pub use resolve::{ResolveError, ResolvedDictionarySet, resolve};
