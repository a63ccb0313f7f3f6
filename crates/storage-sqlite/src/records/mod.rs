//! Replica table persistence for exams, bookings, and contacts.

pub mod model;
pub mod repository;

pub use model::{BookingDB, ContactDB, ExamDB};
pub use repository::{
    replica_repositories, BookingRepository, ContactRepository, ExamRepository,
};
