pub mod attribute;
pub mod forward_open;
pub mod instance_list;
pub mod unconnected_send;

pub use attribute::{
    AttributeReply, GetAttributeListRequest, SetAttributeListRequest,
    SERVICE_GET_ATTRIBUTE_LIST, SERVICE_SET_ATTRIBUTE_LIST,
};
pub use forward_open::{
    ConnectionTriad, ForwardCloseReply, ForwardCloseRequest, ForwardOpenReply,
    ForwardOpenRequest, DEFAULT_CONNECTION_PATH, SERVICE_FORWARD_CLOSE, SERVICE_FORWARD_OPEN,
};
pub use instance_list::{decode_instance_list, SERVICE_GET_INSTANCE_LIST};
pub use unconnected_send::{UnconnectedSend, DEFAULT_ROUTE_PATH, SERVICE_UNCONNECTED_SEND};
