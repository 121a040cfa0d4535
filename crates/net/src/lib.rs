//! Xlatbench Net - wire-format layer of the tester
//!
//! Builds RFC 2544 style UDP test frames byte-exact, keeps the pre-generated
//! frame templates with direct handles to every mutable field, and provides
//! the TX/RX queue abstraction (an AF_PACKET backend on Linux and an
//! in-memory loopback used by tests).
//!
//! Optimizations:
//! - checksums are maintained incrementally from cached one's-complement sums
//! - no allocation after template construction
//! - templates exist in rotating copies to tolerate in-flight DMA reads

pub mod checksum;
pub mod frame;
pub mod port;
pub mod template;

pub use frame::FrameKind;
pub use port::{PortPair, RecvFrame, RxQueue, TxQueue};
pub use template::{FrameTemplate, TemplateBank};
