mod envelope;
mod error;
pub mod payload;
pub mod position;
pub mod proto;
pub mod telemetry;

pub use envelope::{decode_data, decode_envelope, decode_json};
pub use error::{CodecError, Result};
pub use payload::{decode_payload, PayloadKind};
pub use position::PositionReport;
pub use proto::PortNum;
pub use telemetry::PowerReading;
