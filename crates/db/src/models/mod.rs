pub mod job;
pub mod notification;
pub mod result;
pub mod status;
