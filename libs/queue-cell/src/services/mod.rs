pub mod booking;
pub mod calendar;
pub mod clock;
pub mod completion;
pub mod ledger;
pub mod locks;
pub mod position;
pub mod scheduler;
pub mod sweeper;

pub use booking::BookingCoordinator;
pub use calendar::SlotCalendar;
pub use clock::{Clock, FixedClock, SystemClock};
pub use completion::AppointmentCompletionService;
pub use ledger::QueueLedger;
pub use locks::ScopeLocks;
pub use position::PositionEstimator;
pub use scheduler::ClinicScheduler;
pub use sweeper::TimeTransitionSweeper;
