//! Message type catalog
//!
//! Message type numbers are part of the wire contract and never change. The
//! catalog records each message's fixed-width leading arguments so frames can
//! be rendered for logs; a `dynamic` argument marks the schema-dependent tail.

use crate::wire::value::FieldType;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt::Write;

/// Message type numbers
#[allow(missing_docs)]
pub mod msg {
    // Client dialect
    pub const CLIENT_HELLO: u16 = 1;
    pub const CLIENT_HELLO_RESP: u16 = 2;
    pub const CLIENT_DISCONNECT: u16 = 3;
    pub const CLIENT_EJECT: u16 = 4;
    pub const CLIENT_HEARTBEAT: u16 = 5;
    pub const CLIENT_OBJECT_SET_FIELD: u16 = 120;
    pub const CLIENT_OBJECT_SET_FIELDS: u16 = 121;
    pub const CLIENT_OBJECT_LEAVING: u16 = 132;
    pub const CLIENT_OBJECT_LOCATION: u16 = 140;
    pub const CLIENT_ENTER_OBJECT_REQUIRED: u16 = 142;
    pub const CLIENT_ENTER_OBJECT_REQUIRED_OTHER: u16 = 143;
    pub const CLIENT_DONE_SET_FIELDS: u16 = 160;
    pub const CLIENT_ENTER_OBJECT_REQUIRED_OWNER: u16 = 172;
    pub const CLIENT_ENTER_OBJECT_REQUIRED_OTHER_OWNER: u16 = 173;
    pub const CLIENT_ADD_INTEREST: u16 = 200;
    pub const CLIENT_ADD_INTEREST_MULTIPLE: u16 = 201;
    pub const CLIENT_REMOVE_INTEREST: u16 = 203;
    pub const CLIENT_DONE_INTEREST_RESP: u16 = 204;

    // Client agent
    pub const CLIENTAGENT_SET_STATE: u16 = 1000;
    pub const CLIENTAGENT_SET_CLIENT_ID: u16 = 1001;
    pub const CLIENTAGENT_SEND_DATAGRAM: u16 = 1002;
    pub const CLIENTAGENT_EJECT: u16 = 1004;
    pub const CLIENTAGENT_DROP: u16 = 1005;
    pub const CLIENTAGENT_GET_NETWORK_ADDRESS: u16 = 1006;
    pub const CLIENTAGENT_GET_NETWORK_ADDRESS_RESP: u16 = 1007;
    pub const CLIENTAGENT_DECLARE_OBJECT: u16 = 1010;
    pub const CLIENTAGENT_UNDECLARE_OBJECT: u16 = 1011;
    pub const CLIENTAGENT_ADD_SESSION_OBJECT: u16 = 1012;
    pub const CLIENTAGENT_REMOVE_SESSION_OBJECT: u16 = 1013;
    pub const CLIENTAGENT_SET_FIELDS_SENDABLE: u16 = 1014;
    pub const CLIENTAGENT_GET_TLVS: u16 = 1015;
    pub const CLIENTAGENT_GET_TLVS_RESP: u16 = 1016;
    pub const CLIENTAGENT_OPEN_CHANNEL: u16 = 1100;
    pub const CLIENTAGENT_CLOSE_CHANNEL: u16 = 1101;
    pub const CLIENTAGENT_ADD_POST_REMOVE: u16 = 1110;
    pub const CLIENTAGENT_CLEAR_POST_REMOVE: u16 = 1111;
    pub const CLIENTAGENT_ADD_INTEREST: u16 = 1200;
    pub const CLIENTAGENT_ADD_INTEREST_MULTIPLE: u16 = 1201;
    pub const CLIENTAGENT_REMOVE_INTEREST: u16 = 1203;
    pub const CLIENTAGENT_DONE_INTEREST_RESP: u16 = 1204;

    // State server
    pub const STATESERVER_CREATE_OBJECT_WITH_REQUIRED: u16 = 2000;
    pub const STATESERVER_CREATE_OBJECT_WITH_REQUIRED_OTHER: u16 = 2001;
    pub const STATESERVER_DELETE_AI_OBJECTS: u16 = 2009;
    pub const STATESERVER_OBJECT_GET_FIELD: u16 = 2010;
    pub const STATESERVER_OBJECT_GET_FIELD_RESP: u16 = 2011;
    pub const STATESERVER_OBJECT_GET_FIELDS: u16 = 2012;
    pub const STATESERVER_OBJECT_GET_FIELDS_RESP: u16 = 2013;
    pub const STATESERVER_OBJECT_GET_ALL: u16 = 2014;
    pub const STATESERVER_OBJECT_GET_ALL_RESP: u16 = 2015;
    pub const STATESERVER_OBJECT_SET_FIELD: u16 = 2020;
    pub const STATESERVER_OBJECT_SET_FIELDS: u16 = 2021;
    pub const STATESERVER_OBJECT_DELETE_FIELD_RAM: u16 = 2030;
    pub const STATESERVER_OBJECT_DELETE_FIELDS_RAM: u16 = 2031;
    pub const STATESERVER_OBJECT_DELETE_RAM: u16 = 2032;
    pub const STATESERVER_OBJECT_SET_LOCATION: u16 = 2040;
    pub const STATESERVER_OBJECT_CHANGING_LOCATION: u16 = 2041;
    pub const STATESERVER_OBJECT_ENTER_LOCATION_WITH_REQUIRED: u16 = 2042;
    pub const STATESERVER_OBJECT_ENTER_LOCATION_WITH_REQUIRED_OTHER: u16 = 2043;
    pub const STATESERVER_OBJECT_GET_LOCATION: u16 = 2044;
    pub const STATESERVER_OBJECT_GET_LOCATION_RESP: u16 = 2045;
    pub const STATESERVER_OBJECT_LOCATION_ACK: u16 = 2046;
    pub const STATESERVER_OBJECT_SET_AI: u16 = 2050;
    pub const STATESERVER_OBJECT_CHANGING_AI: u16 = 2051;
    pub const STATESERVER_OBJECT_ENTER_AI_WITH_REQUIRED: u16 = 2052;
    pub const STATESERVER_OBJECT_ENTER_AI_WITH_REQUIRED_OTHER: u16 = 2053;
    pub const STATESERVER_OBJECT_GET_AI: u16 = 2054;
    pub const STATESERVER_OBJECT_GET_AI_RESP: u16 = 2055;
    pub const STATESERVER_OBJECT_SET_OWNER: u16 = 2060;
    pub const STATESERVER_OBJECT_CHANGING_OWNER: u16 = 2061;
    pub const STATESERVER_OBJECT_ENTER_OWNER_WITH_REQUIRED: u16 = 2062;
    pub const STATESERVER_OBJECT_ENTER_OWNER_WITH_REQUIRED_OTHER: u16 = 2063;
    pub const STATESERVER_OBJECT_ENTER_INTEREST_WITH_REQUIRED: u16 = 2066;
    pub const STATESERVER_OBJECT_ENTER_INTEREST_WITH_REQUIRED_OTHER: u16 = 2067;
    pub const STATESERVER_OBJECT_GET_ZONE_OBJECTS: u16 = 2100;
    pub const STATESERVER_OBJECT_GET_ZONES_OBJECTS: u16 = 2102;
    pub const STATESERVER_OBJECT_GET_CHILDREN: u16 = 2104;
    pub const STATESERVER_OBJECT_GET_ZONE_COUNT: u16 = 2110;
    pub const STATESERVER_OBJECT_GET_ZONE_COUNT_RESP: u16 = 2111;
    pub const STATESERVER_OBJECT_GET_ZONES_COUNT: u16 = 2112;
    pub const STATESERVER_OBJECT_GET_ZONES_COUNT_RESP: u16 = 2113;
    pub const STATESERVER_OBJECT_GET_CHILD_COUNT: u16 = 2114;
    pub const STATESERVER_OBJECT_GET_CHILD_COUNT_RESP: u16 = 2115;
    pub const STATESERVER_OBJECT_DELETE_ZONE: u16 = 2120;
    pub const STATESERVER_OBJECT_DELETE_ZONES: u16 = 2122;
    pub const STATESERVER_OBJECT_DELETE_CHILDREN: u16 = 2124;
    pub const STATESERVER_GET_ACTIVE_ZONES: u16 = 2125;
    pub const STATESERVER_GET_ACTIVE_ZONES_RESP: u16 = 2126;

    // Database state server
    pub const DBSS_OBJECT_ACTIVATE_WITH_DEFAULTS: u16 = 2200;
    pub const DBSS_OBJECT_ACTIVATE_WITH_DEFAULTS_OTHER: u16 = 2201;
    pub const DBSS_OBJECT_GET_ACTIVATED: u16 = 2207;
    pub const DBSS_OBJECT_GET_ACTIVATED_RESP: u16 = 2208;
    pub const DBSS_OBJECT_DELETE_FIELD_DISK: u16 = 2230;
    pub const DBSS_OBJECT_DELETE_FIELDS_DISK: u16 = 2231;
    pub const DBSS_OBJECT_DELETE_DISK: u16 = 2232;

    // Database server
    pub const DBSERVER_CREATE_OBJECT: u16 = 3000;
    pub const DBSERVER_CREATE_OBJECT_RESP: u16 = 3001;
    pub const DBSERVER_OBJECT_GET_FIELD: u16 = 3010;
    pub const DBSERVER_OBJECT_GET_FIELD_RESP: u16 = 3011;
    pub const DBSERVER_OBJECT_GET_FIELDS: u16 = 3012;
    pub const DBSERVER_OBJECT_GET_FIELDS_RESP: u16 = 3013;
    pub const DBSERVER_OBJECT_GET_ALL: u16 = 3014;
    pub const DBSERVER_OBJECT_GET_ALL_RESP: u16 = 3015;
    pub const DBSERVER_OBJECT_SET_FIELD: u16 = 3020;
    pub const DBSERVER_OBJECT_SET_FIELDS: u16 = 3021;
    pub const DBSERVER_OBJECT_SET_FIELD_IF_EQUALS: u16 = 3022;
    pub const DBSERVER_OBJECT_SET_FIELD_IF_EQUALS_RESP: u16 = 3023;
    pub const DBSERVER_OBJECT_DELETE_FIELD: u16 = 3030;
    pub const DBSERVER_OBJECT_DELETE_FIELDS: u16 = 3031;
    pub const DBSERVER_OBJECT_DELETE: u16 = 3032;

    // Message director control
    pub const CONTROL_ADD_CHANNEL: u16 = 9000;
    pub const CONTROL_REMOVE_CHANNEL: u16 = 9001;
    pub const CONTROL_ADD_RANGE: u16 = 9002;
    pub const CONTROL_REMOVE_RANGE: u16 = 9003;
    pub const CONTROL_ADD_POST_REMOVE: u16 = 9010;
    pub const CONTROL_CLEAR_POST_REMOVES: u16 = 9011;
    pub const CONTROL_SET_CON_NAME: u16 = 9012;
    pub const CONTROL_SET_CON_URL: u16 = 9013;
    pub const CONTROL_LOG_MESSAGE: u16 = 9014;
}

/// Fixed-width argument kinds used by the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Unsigned 8-bit integer
    UInt8,
    /// Unsigned 16-bit integer
    UInt16,
    /// Unsigned 32-bit integer
    UInt32,
    /// Unsigned 64-bit integer
    UInt64,
    /// Single byte flag
    Bool,
    /// Length-prefixed text
    String,
    /// Length-prefixed bytes
    Blob,
    /// Schema-dependent remainder of the message
    Dynamic,
}

impl ArgKind {
    /// Wire type of a fixed argument; `None` for the dynamic tail
    pub fn field_type(self) -> Option<FieldType> {
        match self {
            ArgKind::UInt8 | ArgKind::Bool => Some(FieldType::UInt8),
            ArgKind::UInt16 => Some(FieldType::UInt16),
            ArgKind::UInt32 => Some(FieldType::UInt32),
            ArgKind::UInt64 => Some(FieldType::UInt64),
            ArgKind::String => Some(FieldType::String),
            ArgKind::Blob => Some(FieldType::Blob),
            ArgKind::Dynamic => None,
        }
    }
}

/// One named argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolArg {
    /// Argument name
    pub name: &'static str,
    /// Argument kind
    pub kind: ArgKind,
}

/// Catalog entry for one message type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolMessageSpec {
    /// Constant name
    pub name: &'static str,
    /// Message type number
    pub msg_type: u16,
    /// Leading arguments in wire order
    pub args: &'static [ProtocolArg],
}

impl ProtocolMessageSpec {
    /// Control messages are addressed to the message director itself
    pub fn is_control(&self) -> bool {
        self.msg_type >= 9000
    }
}

macro_rules! catalog {
    ($($name:ident { $($arg:ident: $kind:ident),* $(; $dynamic:ident)* }),* $(,)?) => {
        &[
            $(
                ProtocolMessageSpec {
                    name: stringify!($name),
                    msg_type: msg::$name,
                    args: &[
                        $(ProtocolArg { name: stringify!($arg), kind: ArgKind::$kind },)*
                        $(ProtocolArg { name: stringify!($dynamic), kind: ArgKind::Dynamic },)*
                    ],
                },
            )*
        ]
    };
}

/// Every known message type
pub static CATALOG: &[ProtocolMessageSpec] = catalog! {
    CLIENT_HELLO { dc_hash: UInt32, version: String },
    CLIENT_HELLO_RESP {},
    CLIENT_DISCONNECT {},
    CLIENT_EJECT { error_code: UInt16, reason: String },
    CLIENT_HEARTBEAT {},
    CLIENT_OBJECT_SET_FIELD { do_id: UInt32, field_id: UInt16; dynamic },
    CLIENT_OBJECT_SET_FIELDS { do_id: UInt32, field_count: UInt16; dynamic },
    CLIENT_OBJECT_LEAVING { do_id: UInt32 },
    CLIENT_OBJECT_LOCATION { do_id: UInt32, parent_id: UInt32, zone_id: UInt32 },
    CLIENT_ENTER_OBJECT_REQUIRED {
        do_id: UInt32,
        parent_id: UInt32,
        zone_id: UInt32,
        dclass_id: UInt16;
        dynamic
    },
    CLIENT_ENTER_OBJECT_REQUIRED_OTHER {
        do_id: UInt32,
        parent_id: UInt32,
        zone_id: UInt32,
        dclass_id: UInt16;
        dynamic
    },
    CLIENT_DONE_SET_FIELDS { context: UInt32 },
    CLIENT_ENTER_OBJECT_REQUIRED_OWNER {
        do_id: UInt32,
        parent_id: UInt32,
        zone_id: UInt32,
        dclass_id: UInt16;
        dynamic
    },
    CLIENT_ENTER_OBJECT_REQUIRED_OTHER_OWNER {
        do_id: UInt32,
        parent_id: UInt32,
        zone_id: UInt32,
        dclass_id: UInt16;
        dynamic
    },
    CLIENT_ADD_INTEREST {
        context: UInt32,
        interest_id: UInt16,
        parent_id: UInt32,
        zone_id: UInt32
    },
    CLIENT_ADD_INTEREST_MULTIPLE {
        context: UInt32,
        interest_id: UInt16,
        parent_id: UInt32,
        zone_count: UInt16;
        dynamic
    },
    CLIENT_REMOVE_INTEREST { context: UInt32, interest_id: UInt16 },
    CLIENT_DONE_INTEREST_RESP { context: UInt32, interest_id: UInt16 },
    CLIENTAGENT_SET_STATE { ca_state: UInt16 },
    CLIENTAGENT_SET_CLIENT_ID { channel: UInt64 },
    CLIENTAGENT_SEND_DATAGRAM { datagram: Blob },
    CLIENTAGENT_EJECT { disconnect_code: UInt16, reason: String },
    CLIENTAGENT_DROP {},
    CLIENTAGENT_GET_NETWORK_ADDRESS { context: UInt32 },
    CLIENTAGENT_GET_NETWORK_ADDRESS_RESP {
        context: UInt32,
        remote_ip: String,
        remote_port: UInt16,
        local_ip: String,
        local_port: UInt16
    },
    CLIENTAGENT_DECLARE_OBJECT { do_id: UInt32, dclass_id: UInt16 },
    CLIENTAGENT_UNDECLARE_OBJECT { do_id: UInt32 },
    CLIENTAGENT_ADD_SESSION_OBJECT { do_id: UInt32 },
    CLIENTAGENT_REMOVE_SESSION_OBJECT { do_id: UInt32 },
    CLIENTAGENT_SET_FIELDS_SENDABLE { do_id: UInt32, field_count: UInt16; dynamic },
    CLIENTAGENT_GET_TLVS { context: UInt32 },
    CLIENTAGENT_GET_TLVS_RESP { context: UInt32, tlvs: Blob },
    CLIENTAGENT_OPEN_CHANNEL { channel: UInt64 },
    CLIENTAGENT_CLOSE_CHANNEL { channel: UInt64 },
    CLIENTAGENT_ADD_POST_REMOVE { datagram: Blob },
    CLIENTAGENT_CLEAR_POST_REMOVE {},
    CLIENTAGENT_ADD_INTEREST { interest_id: UInt16, parent_id: UInt32, zone_id: UInt32 },
    CLIENTAGENT_ADD_INTEREST_MULTIPLE {
        interest_id: UInt16,
        parent_id: UInt32,
        zone_count: UInt16;
        dynamic
    },
    CLIENTAGENT_REMOVE_INTEREST { interest_id: UInt16 },
    CLIENTAGENT_DONE_INTEREST_RESP { client_id: UInt64, interest_id: UInt16 },
    STATESERVER_CREATE_OBJECT_WITH_REQUIRED {
        do_id: UInt32,
        parent_id: UInt32,
        zone_id: UInt32,
        dclass_id: UInt16;
        dynamic
    },
    STATESERVER_CREATE_OBJECT_WITH_REQUIRED_OTHER {
        do_id: UInt32,
        parent_id: UInt32,
        zone_id: UInt32,
        dclass_id: UInt16;
        dynamic
    },
    STATESERVER_DELETE_AI_OBJECTS { ai_channel: UInt64 },
    STATESERVER_OBJECT_GET_FIELD { context: UInt32, do_id: UInt32, field_id: UInt16 },
    STATESERVER_OBJECT_GET_FIELD_RESP { context: UInt32, success: Bool, field_id: UInt16; dynamic },
    STATESERVER_OBJECT_GET_FIELDS { context: UInt32, do_id: UInt32, field_count: UInt16; dynamic },
    STATESERVER_OBJECT_GET_FIELDS_RESP { context: UInt32, success: UInt8; dynamic },
    STATESERVER_OBJECT_GET_ALL { context: UInt32, do_id: UInt32 },
    STATESERVER_OBJECT_GET_ALL_RESP {
        context: UInt32,
        do_id: UInt32,
        parent_id: UInt32,
        zone_id: UInt32,
        dclass_id: UInt16;
        dynamic
    },
    STATESERVER_OBJECT_SET_FIELD { do_id: UInt32, field_id: UInt16; dynamic },
    STATESERVER_OBJECT_SET_FIELDS { do_id: UInt32, field_count: UInt16; dynamic },
    STATESERVER_OBJECT_DELETE_FIELD_RAM { do_id: UInt32, field_id: UInt16 },
    STATESERVER_OBJECT_DELETE_FIELDS_RAM { do_id: UInt32, field_count: UInt16; dynamic },
    STATESERVER_OBJECT_DELETE_RAM { do_id: UInt32 },
    STATESERVER_OBJECT_SET_LOCATION { parent_id: UInt32, zone_id: UInt32 },
    STATESERVER_OBJECT_CHANGING_LOCATION {
        do_id: UInt32,
        new_parent_id: UInt32,
        new_zone_id: UInt32,
        old_parent_id: UInt32,
        old_zone_id: UInt32
    },
    STATESERVER_OBJECT_ENTER_LOCATION_WITH_REQUIRED {
        do_id: UInt32,
        parent_id: UInt32,
        zone_id: UInt32,
        dclass_id: UInt16;
        dynamic
    },
    STATESERVER_OBJECT_ENTER_LOCATION_WITH_REQUIRED_OTHER {
        do_id: UInt32,
        parent_id: UInt32,
        zone_id: UInt32,
        dclass_id: UInt16;
        dynamic
    },
    STATESERVER_OBJECT_GET_LOCATION { context: UInt32 },
    STATESERVER_OBJECT_GET_LOCATION_RESP {
        context: UInt32,
        do_id: UInt32,
        parent_id: UInt32,
        zone_id: UInt32
    },
    STATESERVER_OBJECT_LOCATION_ACK { parent_id: UInt32, zone_id: UInt32 },
    STATESERVER_OBJECT_SET_AI { ai_channel: UInt64 },
    STATESERVER_OBJECT_CHANGING_AI {
        do_id: UInt32,
        new_ai_channel: UInt64,
        old_ai_channel: UInt64
    },
    STATESERVER_OBJECT_ENTER_AI_WITH_REQUIRED {
        do_id: UInt32,
        parent_id: UInt32,
        zone_id: UInt32,
        dclass_id: UInt16;
        dynamic
    },
    STATESERVER_OBJECT_ENTER_AI_WITH_REQUIRED_OTHER {
        do_id: UInt32,
        parent_id: UInt32,
        zone_id: UInt32,
        dclass_id: UInt16;
        dynamic
    },
    STATESERVER_OBJECT_GET_AI { context: UInt32 },
    STATESERVER_OBJECT_GET_AI_RESP { context: UInt32, do_id: UInt32, ai_channel: UInt64 },
    STATESERVER_OBJECT_SET_OWNER { owner_channel: UInt64 },
    STATESERVER_OBJECT_CHANGING_OWNER {
        do_id: UInt32,
        new_owner_channel: UInt64,
        old_owner_channel: UInt64
    },
    STATESERVER_OBJECT_ENTER_OWNER_WITH_REQUIRED {
        do_id: UInt32,
        parent_id: UInt32,
        zone_id: UInt32,
        dclass_id: UInt16;
        dynamic
    },
    STATESERVER_OBJECT_ENTER_OWNER_WITH_REQUIRED_OTHER {
        do_id: UInt32,
        parent_id: UInt32,
        zone_id: UInt32,
        dclass_id: UInt16;
        dynamic
    },
    STATESERVER_OBJECT_ENTER_INTEREST_WITH_REQUIRED {
        context: UInt32,
        do_id: UInt32,
        parent_id: UInt32,
        zone_id: UInt32,
        dclass_id: UInt16;
        dynamic
    },
    STATESERVER_OBJECT_ENTER_INTEREST_WITH_REQUIRED_OTHER {
        context: UInt32,
        do_id: UInt32,
        parent_id: UInt32,
        zone_id: UInt32,
        dclass_id: UInt16;
        dynamic
    },
    STATESERVER_OBJECT_GET_ZONE_OBJECTS { context: UInt32, parent_id: UInt32, zone_id: UInt32 },
    STATESERVER_OBJECT_GET_ZONES_OBJECTS {
        context: UInt32,
        parent_id: UInt32,
        zone_count: UInt16;
        dynamic
    },
    STATESERVER_OBJECT_GET_CHILDREN { context: UInt32, parent_id: UInt32 },
    STATESERVER_OBJECT_GET_ZONE_COUNT { context: UInt32, parent_id: UInt32, zone_id: UInt32 },
    STATESERVER_OBJECT_GET_ZONE_COUNT_RESP { context: UInt32, object_count: UInt32 },
    STATESERVER_OBJECT_GET_ZONES_COUNT {
        context: UInt32,
        parent_id: UInt32,
        zone_count: UInt16;
        dynamic
    },
    STATESERVER_OBJECT_GET_ZONES_COUNT_RESP { context: UInt32, object_count: UInt32 },
    STATESERVER_OBJECT_GET_CHILD_COUNT { context: UInt32, parent_id: UInt32 },
    STATESERVER_OBJECT_GET_CHILD_COUNT_RESP { context: UInt32, object_count: UInt32 },
    STATESERVER_OBJECT_DELETE_ZONE { parent_id: UInt32, zone_id: UInt32 },
    STATESERVER_OBJECT_DELETE_ZONES { parent_id: UInt32, zone_count: UInt16; dynamic },
    STATESERVER_OBJECT_DELETE_CHILDREN { parent_id: UInt32 },
    STATESERVER_GET_ACTIVE_ZONES { context: UInt32 },
    STATESERVER_GET_ACTIVE_ZONES_RESP { context: UInt32, zone_count: UInt16; dynamic },
    DBSS_OBJECT_ACTIVATE_WITH_DEFAULTS { do_id: UInt32, parent_id: UInt32, zone_id: UInt32 },
    DBSS_OBJECT_ACTIVATE_WITH_DEFAULTS_OTHER {
        do_id: UInt32,
        parent_id: UInt32,
        zone_id: UInt32,
        dclass_id: UInt16;
        dynamic
    },
    DBSS_OBJECT_GET_ACTIVATED { context: UInt32, do_id: UInt32 },
    DBSS_OBJECT_GET_ACTIVATED_RESP { context: UInt32, do_id: UInt32, is_activated: Bool },
    DBSS_OBJECT_DELETE_FIELD_DISK { do_id: UInt32, field_id: UInt16 },
    DBSS_OBJECT_DELETE_FIELDS_DISK { do_id: UInt32, field_count: UInt16; dynamic },
    DBSS_OBJECT_DELETE_DISK { do_id: UInt32 },
    DBSERVER_CREATE_OBJECT { context: UInt32, dclass_id: UInt16, field_count: UInt16; dynamic },
    DBSERVER_CREATE_OBJECT_RESP { context: UInt32, do_id: UInt32 },
    DBSERVER_OBJECT_GET_FIELD { context: UInt32, do_id: UInt32, field_id: UInt16 },
    DBSERVER_OBJECT_GET_FIELD_RESP { context: UInt32, success: UInt8, field_id: UInt16; dynamic },
    DBSERVER_OBJECT_GET_FIELDS { context: UInt32, do_id: UInt32, field_count: UInt16; dynamic },
    DBSERVER_OBJECT_GET_FIELDS_RESP { context: UInt32, success: UInt8; dynamic },
    DBSERVER_OBJECT_GET_ALL { context: UInt32, do_id: UInt32 },
    DBSERVER_OBJECT_GET_ALL_RESP { context: UInt32, success: UInt8; dynamic },
    DBSERVER_OBJECT_SET_FIELD { do_id: UInt32, field_id: UInt16; dynamic },
    DBSERVER_OBJECT_SET_FIELDS { do_id: UInt32, field_count: UInt16; dynamic },
    DBSERVER_OBJECT_SET_FIELD_IF_EQUALS {
        context: UInt32,
        do_id: UInt32,
        field_id: UInt16;
        dynamic; dynamic
    },
    DBSERVER_OBJECT_SET_FIELD_IF_EQUALS_RESP { context: UInt32, success: UInt8; dynamic },
    DBSERVER_OBJECT_DELETE_FIELD { do_id: UInt32, field_id: UInt16 },
    DBSERVER_OBJECT_DELETE_FIELDS { do_id: UInt32, field_count: UInt16; dynamic },
    DBSERVER_OBJECT_DELETE { do_id: UInt32 },
    CONTROL_ADD_CHANNEL { channel: UInt64 },
    CONTROL_REMOVE_CHANNEL { channel: UInt64 },
    CONTROL_ADD_RANGE { low_channel: UInt64, high_channel: UInt64 },
    CONTROL_REMOVE_RANGE { low_channel: UInt64, high_channel: UInt64 },
    CONTROL_ADD_POST_REMOVE { sender: UInt64, datagram: Blob },
    CONTROL_CLEAR_POST_REMOVES { sender: UInt64 },
    CONTROL_SET_CON_NAME { name: String },
    CONTROL_SET_CON_URL { url: String },
    CONTROL_LOG_MESSAGE { message: Blob },
};

static BY_MSG_TYPE: Lazy<HashMap<u16, &'static ProtocolMessageSpec>> =
    Lazy::new(|| CATALOG.iter().map(|spec| (spec.msg_type, spec)).collect());

static BY_NAME: Lazy<HashMap<&'static str, &'static ProtocolMessageSpec>> =
    Lazy::new(|| CATALOG.iter().map(|spec| (spec.name, spec)).collect());

/// Catalog entry by message type
pub fn by_msg_type(msg_type: u16) -> Option<&'static ProtocolMessageSpec> {
    BY_MSG_TYPE.get(&msg_type).copied()
}

/// Catalog entry by constant name
pub fn by_name(name: &str) -> Option<&'static ProtocolMessageSpec> {
    BY_NAME.get(name).copied()
}

/// Render a message payload for logs.
///
/// Reads only the catalog's fixed arguments and never past the end of
/// `payload`; the dynamic tail is shown as hex.
pub fn describe(msg_type: u16, payload: &[u8]) -> String {
    let Some(spec) = by_msg_type(msg_type) else {
        return format!("UNKNOWN({}) [{} bytes]", msg_type, payload.len());
    };

    let mut out = String::from(spec.name);
    let mut cursor = payload;
    let mut parts = Vec::with_capacity(spec.args.len());

    for arg in spec.args {
        match arg.kind.field_type() {
            Some(ty) => match ty.decode(&mut cursor) {
                Ok(value) => parts.push(format!("{}: {}", arg.name, value)),
                Err(_) => {
                    parts.push(format!("{}: <truncated>", arg.name));
                    cursor = &[];
                    break;
                }
            },
            None => {
                parts.push(format!("{}: 0x{}", arg.name, hex::encode(cursor)));
                cursor = &[];
                break;
            }
        }
    }

    if !parts.is_empty() {
        let _ = write!(out, " {{ {} }}", parts.join(", "));
    }
    if !cursor.is_empty() {
        let _ = write!(out, " +{} trailing bytes", cursor.len());
    }
    out
}
