pub mod automatic_payment;
pub mod grade;
pub mod notifications;
pub mod payout;
pub mod scheduler;

pub use automatic_payment::{
    AutomaticPaymentService, CaptureSweepReport, ChargeInput, ChargeOutcome,
};
pub use grade::{GradeOutcome, GradeService};
pub use notifications::{HttpNotifier, LogNotifier};
pub use payout::{CastPayoutService, DispatchOutcome, DueSweepReport, MonthlyCloseReport};
pub use scheduler::{run_scheduler, JobSchedules};
