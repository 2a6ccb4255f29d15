pub mod access_token;
pub mod api_server;
pub mod place_canvas;
pub mod place_client;

pub use access_token::{fetch_access_token, TokenStore};
pub use api_server::{bind_api_server, start_api_server, RunningServer};
pub use place_canvas::GraphqlCanvasSource;
pub use place_client::GraphqlPlacementClient;
