mod assignment_repo;
mod job_repo;
mod notification_repo;
mod result_repo;

pub use assignment_repo::AssignmentRepo;
pub use job_repo::JobRepo;
pub use notification_repo::NotificationRepo;
pub use result_repo::ResultRepo;
