//! Adapters: host implementations of the port traits.
//!
//! | Adapter      | Implements          | Backed by                      |
//! |--------------|---------------------|--------------------------------|
//! | `sim_bus`    | I2c + BusTransport  | Register-file device models    |
//! | `sim_stack`  | StackPort           | In-memory GATT table / advert  |
//! | `indicators` | IndicatorPort       | In-memory LED / buzzer state   |
//! | `log_sink`   | EventSink           | `log` facade                   |
//! | `time`       | Clock               | `std::time::Instant`           |

pub mod indicators;
pub mod log_sink;
pub mod sim_bus;
pub mod sim_stack;
pub mod time;
