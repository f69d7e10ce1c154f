pub mod clock;
pub mod id;

pub use clock::ReceiptClock;
