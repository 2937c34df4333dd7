//! Client for Samsung Smart TVs
//!
//! Three surfaces are covered: the remote control WebSocket channel ([`Remote`]), the Art Mode
//! channel of Frame TVs ([`ArtMode`]) with its D2D file transfers, and the small REST API
//! ([`Rest`]). Every client comes in a tokio flavour and a blocking one.

pub mod art;
mod command;
mod connection;
mod constants;
mod error;
pub mod event;
mod frame;
mod remote;
mod rest;
mod token;

pub use art::{
    ArtMode, ArtModeState, ArtOptions, ArtRequest, BlockingArtMode, CorrelationIds,
    FallbackPolicy, MatteList, Response, Slideshow, StatusEvent, UploadOptions, UploadSource,
};
pub use command::Command;
pub use connection::{
    BlockingConnection, Connection, ConnectionConfig, ConnectionState, Listener, Sender,
};
pub use constants::{DEFAULT_PORT, SECURE_PORT};
pub use error::{ClientError, ConnectionError, Error, ResponseError, Result};
pub use frame::{Frame, Payload};
pub use remote::{BlockingRemote, KeyAction, Remote, RemoteKey};
pub use rest::{frame_tv_supported, powered_on, BlockingRest, DeviceInfoSource, Rest};
pub use token::TokenStore;
