//! Domain types: bars, instruments, positions, trade records, engine events.

pub mod bar;
pub mod event;
pub mod ids;
pub mod instrument;
pub mod position;
pub mod trade;

pub use bar::Bar;
pub use event::{EngineEvent, StopChangeReason, TradeIntent};
pub use ids::Ticket;
pub use instrument::Instrument;
pub use position::{ExitFlags, Position, Side};
pub use trade::TradeRecord;
