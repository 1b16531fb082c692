//! RTMP protocol constants

/// Protocol version sent in C0
pub const RTMP_VERSION: u8 = 3;
/// Size of C1/C2/S1/S2
pub const HANDSHAKE_SIZE: usize = 1536;

pub const DEFAULT_PORT: u16 = 1935;
/// Chunk size until a Set Chunk Size message says otherwise
pub const DEFAULT_CHUNK_SIZE: u32 = 128;
/// Chunk size announced by publishers
pub const PUBLISH_CHUNK_SIZE: u32 = 4096;
pub const MAX_CHUNK_SIZE: u32 = 0x7FFF_FFFF;
pub const DEFAULT_WINDOW_ACK_SIZE: u32 = 2_500_000;
pub const DEFAULT_PEER_BANDWIDTH: u32 = 2_500_000;

/// Timestamps at or above this use the extended field
pub const EXTENDED_TIMESTAMP: u32 = 0xFF_FFFF;

// Message type ids
pub const MSG_SET_CHUNK_SIZE: u8 = 1;
pub const MSG_ABORT: u8 = 2;
pub const MSG_ACKNOWLEDGEMENT: u8 = 3;
pub const MSG_USER_CONTROL: u8 = 4;
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;
pub const MSG_AUDIO: u8 = 8;
pub const MSG_VIDEO: u8 = 9;
pub const MSG_DATA_AMF0: u8 = 18;
pub const MSG_COMMAND_AMF0: u8 = 20;

// Chunk stream ids used when publishing
pub const CSID_PROTOCOL: u32 = 2;
pub const CSID_COMMAND: u32 = 3;
pub const CSID_AUDIO: u32 = 4;
pub const CSID_DATA: u32 = 5;
pub const CSID_VIDEO: u32 = 6;

// Command names
pub const CMD_CONNECT: &str = "connect";
pub const CMD_RELEASE_STREAM: &str = "releaseStream";
pub const CMD_FC_PUBLISH: &str = "FCPublish";
pub const CMD_CREATE_STREAM: &str = "createStream";
pub const CMD_PUBLISH: &str = "publish";
pub const CMD_PLAY: &str = "play";
pub const CMD_RESULT: &str = "_result";
pub const CMD_ERROR: &str = "_error";
pub const CMD_ON_STATUS: &str = "onStatus";
pub const CMD_SET_DATA_FRAME: &str = "@setDataFrame";
pub const ON_METADATA: &str = "onMetaData";

// Status codes
pub const NC_CONNECT_SUCCESS: &str = "NetConnection.Connect.Success";
pub const NS_PUBLISH_START: &str = "NetStream.Publish.Start";
pub const NS_PLAY_START: &str = "NetStream.Play.Start";
pub const NS_PLAY_STOP: &str = "NetStream.Play.Stop";
pub const NS_PLAY_UNPUBLISH: &str = "NetStream.Play.UnpublishNotify";
