//! modemlink-test-harness: mock devices and endpoints for modemlink tests.
//!
//! - [`MockTransport`]: scripted raw device for handshake tests
//! - [`MockDevices`]: a [`DeviceProvider`](modemlink_core::DeviceProvider)
//!   whose channels are in-memory pipes driven by a simulated modem
//! - [`MockManagement`]: a [`ManagementConnector`](modemlink_core::ManagementConnector)
//!   the test feeds lifecycle notices through

pub mod mock_devices;
pub mod mock_management;
pub mod mock_serial;

pub use mock_devices::MockDevices;
pub use mock_management::MockManagement;
pub use mock_serial::{MockProbe, MockReply, MockTransport};
