// hub-test-utils: shared test helpers for driving the hub's WebSocket
// endpoint end to end, against a real `axum::serve` instance.

pub mod mock_ws_client;
pub mod signing_identity;

pub use mock_ws_client::MockWsClient;
pub use signing_identity::TestIdentity;
