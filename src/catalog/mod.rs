//! Task catalog: loading, lookup and seeded sampling of SWE-bench instances.

pub mod loader;
pub mod store;
pub mod task;

pub use loader::{load_file, CatalogLoader, LoaderConfig};
pub use store::TaskCatalog;
pub use task::{Dataset, Task};
