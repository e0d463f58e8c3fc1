pub mod coordinator;
pub mod fingerprint;
pub mod gate;
pub mod storage;

pub use coordinator::{CheckOutcome, IdempotencyCoordinator};
pub use fingerprint::fingerprint_value;
pub use gate::{Admission, GateConfig, RequestGate};
pub use storage::{
    IdempotencyRecord, IdempotencyStatus, KeyedRecordStore, MemoryStore, RecordUpdate,
    RedisConnectOptions, RedisRecordStore,
};
