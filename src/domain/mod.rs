pub mod conversion;
pub mod entities;
pub mod grade;
pub mod schedule;

pub use entities::{
    ActorType, Cast, CastPayout, EntryType, Grade, Guest, Payment, PaymentStatus, PayoutStatus,
    PayoutType, PointTransaction,
};
