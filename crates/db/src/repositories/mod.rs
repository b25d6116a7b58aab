pub mod caption_repo;
pub mod dataset_repo;
pub mod job_repo;

pub use caption_repo::CaptionRepo;
pub use dataset_repo::DatasetRepo;
pub use job_repo::JobRepo;
