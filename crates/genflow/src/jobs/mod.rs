pub mod memory;
pub mod model;
pub mod reaper;
pub mod repo;
pub mod store;
pub mod tracker;

pub use memory::MemoryJobStore;
pub use model::{GenerationJob, GenerationKind, JobPatch, JobStatus, TenantScope};
pub use reaper::{ReapReport, StalenessReaper};
pub use repo::PgJobStore;
pub use store::{BrandAccess, JobStore};
pub use tracker::JobTracker;
