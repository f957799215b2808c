pub mod breadcrumb;
pub mod encoding;
pub mod error;
pub mod fetcher;
pub mod jsonld;
pub mod normalize;
pub mod page;
pub mod product;
pub mod text;

pub use breadcrumb::{BreadcrumbChain, BreadcrumbExtractor, BreadcrumbItem, BreadcrumbRules};
pub use error::{FetchError, ScanError};
pub use fetcher::{FetchResult, Fetcher, FetcherConfig, Page};
pub use normalize::{NormalizedUrl, normalize, resolve};
pub use page::{PageData, PageExtractor};
pub use product::{GalleryField, ProductRecord, StockStatus};
