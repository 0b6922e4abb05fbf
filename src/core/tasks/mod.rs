// src/core/tasks/mod.rs

//! Long-running background tasks supporting the reconfiguration protocol:
//! the keyed, retransmitting protocol-task scheduler (§4.3).

pub mod scheduler;
