pub mod cleanup;
pub mod ledger;
pub mod payment;
pub mod settlement;

pub use cleanup::{ExpiryService, SweepReport};
pub use ledger::SeatLedger;
pub use payment::{LiqPayGateway, PaymentGateway};
pub use settlement::{Checkout, Refresh, Settlement, SettlementCoordinator};
