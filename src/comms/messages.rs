//! Typed message bodies
//!
//! Each body knows its own payload layout. Bodies whose layout depends on the
//! schema (field values, required-field lists) take the repository as an
//! argument when decoding or constructing.

use crate::comms::payload::{PayloadReader, PayloadWriter};
use crate::comms::protocol::msg;
use crate::core::error::{Result, SchemaError};
use crate::core::types::{ChannelId, ClassId, FieldId, InterestId, ObjectId, ZoneId};
use crate::schema::{Audience, SchemaRepository};
use crate::wire::value::FieldValue;
use bytes::Bytes;

/// Field id and value pair
pub type FieldEntry = (FieldId, FieldValue);

/// Client handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    /// Schema hash the client was built against
    pub dc_hash: u32,
    /// Client version string
    pub version: String,
}

impl Hello {
    /// Encode the payload
    pub fn encode(&self) -> Bytes {
        PayloadWriter::new()
            .put_u32(self.dc_hash)
            .put_string(&self.version)
            .finish()
    }

    /// Decode the payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(payload);
        Ok(Self {
            dc_hash: r.read_u32()?,
            version: r.read_string()?,
        })
    }
}

/// Disconnect notice from the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eject {
    /// Reason code
    pub code: u16,
    /// Human readable reason
    pub reason: String,
}

impl Eject {
    /// Encode the payload
    pub fn encode(&self) -> Bytes {
        PayloadWriter::new()
            .put_u16(self.code)
            .put_string(&self.reason)
            .finish()
    }

    /// Decode the payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(payload);
        Ok(Self {
            code: r.read_u16()?,
            reason: r.read_string()?,
        })
    }
}

/// Single field update (client 120, internal 2020)
#[derive(Debug, Clone, PartialEq)]
pub struct SetField {
    /// Target object
    pub object: ObjectId,
    /// Target field
    pub field: FieldId,
    /// New value
    pub value: FieldValue,
}

impl SetField {
    /// Encode the payload
    pub fn encode(&self) -> Bytes {
        PayloadWriter::with_capacity(6 + self.value.encoded_len())
            .put_object_id(self.object)
            .put_field_id(self.field)
            .put_value(&self.value)
            .finish()
    }

    /// Decode the payload, reading the value with the field's declared type
    pub fn decode(payload: &[u8], schema: &SchemaRepository) -> Result<Self> {
        let mut r = PayloadReader::new(payload);
        let object = r.read_object_id()?;
        let field = r.read_field_id()?;
        let ty = &schema.field(field)?.field_type;
        let value = r.read_value(ty)?;
        r.expect_end()?;
        Ok(Self { object, field, value })
    }
}

/// Several field updates applied together (client 121, internal 2021)
#[derive(Debug, Clone, PartialEq)]
pub struct SetFields {
    /// Target object
    pub object: ObjectId,
    /// Updates in wire order
    pub fields: Vec<FieldEntry>,
}

impl SetFields {
    /// Encode the payload
    pub fn encode(&self) -> Bytes {
        let w = PayloadWriter::new()
            .put_object_id(self.object)
            .put_u16(self.fields.len() as u16);
        put_entries(w, &self.fields).finish()
    }

    /// Decode the payload
    pub fn decode(payload: &[u8], schema: &SchemaRepository) -> Result<Self> {
        let mut r = PayloadReader::new(payload);
        let object = r.read_object_id()?;
        let count = r.read_u16()?;
        let fields = read_entries(&mut r, count, schema)?;
        r.expect_end()?;
        Ok(Self { object, fields })
    }
}

/// Object left the client's interest (132)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectLeaving {
    /// Object that left
    pub object: ObjectId,
}

impl ObjectLeaving {
    /// Encode the payload
    pub fn encode(&self) -> Bytes {
        PayloadWriter::new().put_object_id(self.object).finish()
    }

    /// Decode the payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(payload);
        Ok(Self {
            object: r.read_object_id()?,
        })
    }
}

/// Object location, in either direction (140)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectLocation {
    /// Object being placed
    pub object: ObjectId,
    /// New parent
    pub parent: ObjectId,
    /// New zone
    pub zone: ZoneId,
}

impl ObjectLocation {
    /// Encode the payload
    pub fn encode(&self) -> Bytes {
        PayloadWriter::new()
            .put_object_id(self.object)
            .put_object_id(self.parent)
            .put_zone_id(self.zone)
            .finish()
    }

    /// Decode the payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(payload);
        Ok(Self {
            object: r.read_object_id()?,
            parent: r.read_object_id()?,
            zone: r.read_zone_id()?,
        })
    }
}

/// Which initial-state message carries an [`ObjectEntry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Client sees the object, required fields only (142)
    ClientRequired,
    /// Client sees the object, required and other fields (143)
    ClientRequiredOther,
    /// Owning client sees the object, required fields only (172)
    OwnerRequired,
    /// Owning client sees the object, required and other fields (173)
    OwnerRequiredOther,
    /// AI process takes the object, required fields only (2052)
    AiRequired,
    /// AI process takes the object, required and other fields (2053)
    AiRequiredOther,
    /// Object created on the state server, required fields only (2000)
    Create,
    /// Object created on the state server with other fields (2001)
    CreateOther,
}

impl EntryKind {
    /// Kind carried by a message type
    pub fn from_msg_type(msg_type: u16) -> Option<Self> {
        Some(match msg_type {
            msg::CLIENT_ENTER_OBJECT_REQUIRED => Self::ClientRequired,
            msg::CLIENT_ENTER_OBJECT_REQUIRED_OTHER => Self::ClientRequiredOther,
            msg::CLIENT_ENTER_OBJECT_REQUIRED_OWNER => Self::OwnerRequired,
            msg::CLIENT_ENTER_OBJECT_REQUIRED_OTHER_OWNER => Self::OwnerRequiredOther,
            msg::STATESERVER_OBJECT_ENTER_AI_WITH_REQUIRED => Self::AiRequired,
            msg::STATESERVER_OBJECT_ENTER_AI_WITH_REQUIRED_OTHER => Self::AiRequiredOther,
            msg::STATESERVER_CREATE_OBJECT_WITH_REQUIRED => Self::Create,
            msg::STATESERVER_CREATE_OBJECT_WITH_REQUIRED_OTHER => Self::CreateOther,
            _ => return None,
        })
    }

    /// Message type for this kind
    pub fn msg_type(self) -> u16 {
        match self {
            Self::ClientRequired => msg::CLIENT_ENTER_OBJECT_REQUIRED,
            Self::ClientRequiredOther => msg::CLIENT_ENTER_OBJECT_REQUIRED_OTHER,
            Self::OwnerRequired => msg::CLIENT_ENTER_OBJECT_REQUIRED_OWNER,
            Self::OwnerRequiredOther => msg::CLIENT_ENTER_OBJECT_REQUIRED_OTHER_OWNER,
            Self::AiRequired => msg::STATESERVER_OBJECT_ENTER_AI_WITH_REQUIRED,
            Self::AiRequiredOther => msg::STATESERVER_OBJECT_ENTER_AI_WITH_REQUIRED_OTHER,
            Self::Create => msg::STATESERVER_CREATE_OBJECT_WITH_REQUIRED,
            Self::CreateOther => msg::STATESERVER_CREATE_OBJECT_WITH_REQUIRED_OTHER,
        }
    }

    /// Whose view of the required fields the message carries
    pub fn audience(self) -> Audience {
        match self {
            Self::ClientRequired | Self::ClientRequiredOther => Audience::Client { is_owner: false },
            Self::OwnerRequired | Self::OwnerRequiredOther => Audience::Client { is_owner: true },
            Self::AiRequired | Self::AiRequiredOther | Self::Create | Self::CreateOther => {
                Audience::Internal
            }
        }
    }

    /// Whether a counted list of other fields follows the required ones
    pub fn has_other(self) -> bool {
        matches!(
            self,
            Self::ClientRequiredOther
                | Self::OwnerRequiredOther
                | Self::AiRequiredOther
                | Self::CreateOther
        )
    }
}

/// Initial state of an object: header, required values and other values
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEntry {
    /// Object id
    pub object: ObjectId,
    /// Parent object
    pub parent: ObjectId,
    /// Zone within the parent
    pub zone: ZoneId,
    /// Object class
    pub class: ClassId,
    /// Required fields in schema order
    pub required: Vec<FieldEntry>,
    /// Optional extra fields
    pub other: Vec<FieldEntry>,
}

impl ObjectEntry {
    /// Pair `values` with the class's required fields for `audience`.
    ///
    /// Fails when the count differs from the required-field list or a value
    /// does not match its field's type.
    pub fn with_required(
        schema: &SchemaRepository,
        audience: Audience,
        object: ObjectId,
        parent: ObjectId,
        zone: ZoneId,
        class: ClassId,
        values: Vec<FieldValue>,
    ) -> Result<Self> {
        let ids = schema.required_fields_for(class, audience)?;
        if ids.len() != values.len() {
            return Err(SchemaError::RequiredCountMismatch {
                class,
                expected: ids.len(),
                actual: values.len(),
            }
            .into());
        }
        let mut required = Vec::with_capacity(ids.len());
        for (id, value) in ids.into_iter().zip(values) {
            schema.check_write(class, id, &value)?;
            required.push((id, value));
        }
        Ok(Self {
            object,
            parent,
            zone,
            class,
            required,
            other: Vec::new(),
        })
    }

    /// Attach other fields, checked against the class
    pub fn with_other(mut self, schema: &SchemaRepository, other: Vec<FieldEntry>) -> Result<Self> {
        for (id, value) in &other {
            schema.check_write(self.class, *id, value)?;
        }
        self.other = other;
        Ok(self)
    }

    /// All fields, required first
    pub fn fields(&self) -> impl Iterator<Item = &FieldEntry> {
        self.required.iter().chain(self.other.iter())
    }

    /// Encode the payload for `kind`. Other fields are dropped for kinds
    /// without an other section.
    pub fn encode(&self, kind: EntryKind) -> Bytes {
        let mut w = PayloadWriter::new()
            .put_object_id(self.object)
            .put_object_id(self.parent)
            .put_zone_id(self.zone)
            .put_class_id(self.class);
        for (_, value) in &self.required {
            w = w.put_value(value);
        }
        if kind.has_other() {
            w = w.put_u16(self.other.len() as u16);
            w = put_entries(w, &self.other);
        }
        w.finish()
    }

    /// Decode a payload of `kind`
    pub fn decode(kind: EntryKind, payload: &[u8], schema: &SchemaRepository) -> Result<Self> {
        let mut r = PayloadReader::new(payload);
        let object = r.read_object_id()?;
        let parent = r.read_object_id()?;
        let zone = r.read_zone_id()?;
        let class = r.read_class_id()?;

        let ids = schema.required_fields_for(class, kind.audience())?;
        let mut required = Vec::with_capacity(ids.len());
        for id in ids {
            let value = r.read_value(&schema.field(id)?.field_type)?;
            required.push((id, value));
        }

        let other = if kind.has_other() {
            let count = r.read_u16()?;
            let mut other = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let id = r.read_field_id()?;
                let value = r.read_value(&schema.class_field(class, id)?.field_type)?;
                other.push((id, value));
            }
            other
        } else {
            Vec::new()
        };
        r.expect_end()?;

        Ok(Self {
            object,
            parent,
            zone,
            class,
            required,
            other,
        })
    }
}

/// Open an interest in a zone (200)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddInterest {
    /// Caller context echoed in the response
    pub context: u32,
    /// Interest handle
    pub interest: InterestId,
    /// Parent object
    pub parent: ObjectId,
    /// Zone within the parent
    pub zone: ZoneId,
}

impl AddInterest {
    /// Encode the payload
    pub fn encode(&self) -> Bytes {
        PayloadWriter::new()
            .put_u32(self.context)
            .put_interest_id(self.interest)
            .put_object_id(self.parent)
            .put_zone_id(self.zone)
            .finish()
    }

    /// Decode the payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(payload);
        Ok(Self {
            context: r.read_u32()?,
            interest: r.read_interest_id()?,
            parent: r.read_object_id()?,
            zone: r.read_zone_id()?,
        })
    }
}

/// Interest handle with caller context. Used for remove (203) and for the
/// cluster's acknowledgement (204).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterestRef {
    /// Caller context
    pub context: u32,
    /// Interest handle
    pub interest: InterestId,
}

/// Close an interest (203)
pub type RemoveInterest = InterestRef;

/// Interest acknowledged by the cluster (204)
pub type InterestDone = InterestRef;

impl InterestRef {
    /// Encode the payload
    pub fn encode(&self) -> Bytes {
        PayloadWriter::new()
            .put_u32(self.context)
            .put_interest_id(self.interest)
            .finish()
    }

    /// Decode the payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(payload);
        Ok(Self {
            context: r.read_u32()?,
            interest: r.read_interest_id()?,
        })
    }
}

/// Session state a client agent holds for a client (1000)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ClientAgentState {
    /// Just connected
    New = 0,
    /// Allowed anonymous access
    Anonymous = 1,
    /// Fully authenticated
    Established = 2,
}

impl ClientAgentState {
    /// Encode the payload
    pub fn encode(self) -> Bytes {
        PayloadWriter::new().put_u16(self as u16).finish()
    }

    /// Decode the payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(payload);
        match r.read_u16()? {
            0 => Ok(Self::New),
            1 => Ok(Self::Anonymous),
            2 => Ok(Self::Established),
            other => Err(crate::core::error::NetworkError::Protocol(format!(
                "unknown client agent state {}",
                other
            ))
            .into()),
        }
    }
}

/// Channel subscription change (9000 add, 9001 remove)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlChannel {
    /// Channel to subscribe or unsubscribe
    pub channel: ChannelId,
}

impl ControlChannel {
    /// Encode the payload
    pub fn encode(&self) -> Bytes {
        PayloadWriter::new().put_channel_id(self.channel).finish()
    }

    /// Decode the payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(payload);
        Ok(Self {
            channel: r.read_channel_id()?,
        })
    }
}

/// Object removed from the state server (2032)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteRam {
    /// Deleted object
    pub object: ObjectId,
}

impl DeleteRam {
    /// Encode the payload
    pub fn encode(&self) -> Bytes {
        PayloadWriter::new().put_object_id(self.object).finish()
    }

    /// Decode the payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(payload);
        Ok(Self {
            object: r.read_object_id()?,
        })
    }
}

fn put_entries(mut w: PayloadWriter, entries: &[FieldEntry]) -> PayloadWriter {
    for (id, value) in entries {
        w = w.put_field_id(*id).put_value(value);
    }
    w
}

fn read_entries(
    r: &mut PayloadReader<'_>,
    count: u16,
    schema: &SchemaRepository,
) -> Result<Vec<FieldEntry>> {
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = r.read_field_id()?;
        let value = r.read_value(&schema.field(id)?.field_type)?;
        entries.push((id, value));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{DecodeError, Error};
    use crate::schema::{FieldModifiers, SchemaBuilder};
    use crate::wire::value::FieldType;

    fn required_broadcast() -> FieldModifiers {
        FieldModifiers::new().required().broadcast()
    }

    /// Class 2 carries three required broadcast uint32 fields
    fn schema() -> SchemaRepository {
        SchemaBuilder::new()
            .class("Root", &[], |_| {})
            .class("Named", &[], |c| {
                c.field("name", FieldType::String, required_broadcast());
            })
            .class("Vector", &[], |c| {
                c.field("x", FieldType::UInt32, required_broadcast())
                    .field("y", FieldType::UInt32, required_broadcast())
                    .field("z", FieldType::UInt32, required_broadcast())
                    .field("secret", FieldType::UInt32, FieldModifiers::new().required().ownrecv())
                    .field("label", FieldType::String, FieldModifiers::new().broadcast());
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_hello_layout() {
        let hello = Hello {
            dc_hash: 0xDEADBEEF,
            version: "v1".to_string(),
        };
        let bytes = hello.encode();
        assert_eq!(&bytes[..], &[0xEF, 0xBE, 0xAD, 0xDE, 2, 0, b'v', b'1']);
        assert_eq!(Hello::decode(&bytes).unwrap(), hello);
    }

    #[test]
    fn test_enter_object_required_zero_values() {
        let schema = schema();
        let class = ClassId::new(2);
        let entry = ObjectEntry::with_required(
            &schema,
            Audience::Client { is_owner: false },
            ObjectId::new(1000),
            ObjectId::new(1),
            ZoneId::new(2),
            class,
            vec![FieldValue::UInt32(0); 3],
        )
        .unwrap();

        let payload = entry.encode(EntryKind::ClientRequired);
        // do_id + parent + zone + class
        let header = 4 + 4 + 4 + 2;
        assert_eq!(payload.len(), header + 12);
        assert!(payload[header..].iter().all(|b| *b == 0));
        assert_eq!(&payload[12..14], &2u16.to_le_bytes());

        let decoded = ObjectEntry::decode(EntryKind::ClientRequired, &payload, &schema).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_owner_view_reads_ownrecv_fields() {
        let schema = schema();
        let class = ClassId::new(2);
        let values = vec![
            FieldValue::UInt32(1),
            FieldValue::UInt32(2),
            FieldValue::UInt32(3),
            FieldValue::UInt32(4),
        ];
        let entry = ObjectEntry::with_required(
            &schema,
            Audience::Client { is_owner: true },
            ObjectId::new(1000),
            ObjectId::new(1),
            ZoneId::new(2),
            class,
            values,
        )
        .unwrap();
        let label = schema.field_by_name(class, "label").unwrap().id;
        let entry = entry
            .with_other(&schema, vec![(label, FieldValue::from("door"))])
            .unwrap();

        let payload = entry.encode(EntryKind::OwnerRequiredOther);
        let decoded = ObjectEntry::decode(EntryKind::OwnerRequiredOther, &payload, &schema).unwrap();
        assert_eq!(decoded.required.len(), 4);
        assert_eq!(decoded.other, vec![(label, FieldValue::from("door"))]);
    }

    #[test]
    fn test_required_count_mismatch() {
        let schema = schema();
        let err = ObjectEntry::with_required(
            &schema,
            Audience::Internal,
            ObjectId::new(1000),
            ObjectId::new(1),
            ZoneId::new(2),
            ClassId::new(2),
            vec![FieldValue::UInt32(0); 3],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Schema(SchemaError::RequiredCountMismatch {
                expected: 4,
                actual: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_required_type_mismatch() {
        let schema = schema();
        let err = ObjectEntry::with_required(
            &schema,
            Audience::Client { is_owner: false },
            ObjectId::new(1000),
            ObjectId::new(1),
            ZoneId::new(2),
            ClassId::new(2),
            vec![FieldValue::UInt32(0), FieldValue::UInt16(0), FieldValue::UInt32(0)],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::TypeMismatch { .. })));
    }

    #[test]
    fn test_entry_kinds() {
        for kind in [
            EntryKind::ClientRequired,
            EntryKind::ClientRequiredOther,
            EntryKind::OwnerRequired,
            EntryKind::OwnerRequiredOther,
            EntryKind::AiRequired,
            EntryKind::AiRequiredOther,
            EntryKind::Create,
            EntryKind::CreateOther,
        ] {
            assert_eq!(EntryKind::from_msg_type(kind.msg_type()), Some(kind));
        }
        assert_eq!(EntryKind::from_msg_type(120), None);
        assert_eq!(EntryKind::OwnerRequired.audience(), Audience::Client { is_owner: true });
        assert!(!EntryKind::Create.has_other());
    }

    #[test]
    fn test_set_field_uses_declared_type() {
        let schema = schema();
        let name = schema.field_by_name(ClassId::new(1), "name").unwrap().id;
        let update = SetField {
            object: ObjectId::new(7),
            field: name,
            value: FieldValue::from("bob"),
        };
        let payload = update.encode();
        assert_eq!(SetField::decode(&payload, &schema).unwrap(), update);

        // Value cut short
        let err = SetField::decode(&payload[..payload.len() - 1], &schema).unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::Truncated { .. })));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let schema = schema();
        let class = ClassId::new(2);
        let entry = ObjectEntry::with_required(
            &schema,
            Audience::Client { is_owner: false },
            ObjectId::new(1000),
            ObjectId::new(1),
            ZoneId::new(2),
            class,
            vec![FieldValue::UInt32(0); 3],
        )
        .unwrap();
        let mut payload = entry.encode(EntryKind::ClientRequired).to_vec();
        payload.extend_from_slice(&0u32.to_le_bytes());
        let err = ObjectEntry::decode(EntryKind::ClientRequired, &payload, &schema).unwrap_err();
        assert!(matches!(
            err,
            Error::Decode(DecodeError::TrailingBytes { remaining: 4 })
        ));

        let x = schema.field_by_name(class, "x").unwrap().id;
        let update = SetField {
            object: ObjectId::new(7),
            field: x,
            value: FieldValue::UInt32(9),
        };
        let mut payload = update.encode().to_vec();
        payload.push(0);
        let err = SetField::decode(&payload, &schema).unwrap_err();
        assert!(matches!(
            err,
            Error::Decode(DecodeError::TrailingBytes { remaining: 1 })
        ));

        let update = SetFields {
            object: ObjectId::new(7),
            fields: vec![(x, FieldValue::UInt32(9))],
        };
        let mut payload = update.encode().to_vec();
        payload.extend_from_slice(&[1, 2]);
        let err = SetFields::decode(&payload, &schema).unwrap_err();
        assert!(matches!(
            err,
            Error::Decode(DecodeError::TrailingBytes { remaining: 2 })
        ));
    }

    #[test]
    fn test_set_field_unknown_field() {
        let schema = schema();
        let payload = PayloadWriter::new()
            .put_object_id(ObjectId::new(7))
            .put_field_id(FieldId::new(999))
            .finish();
        let err = SetField::decode(&payload, &schema).unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::UnknownField(_))));
    }

    #[test]
    fn test_set_fields() {
        let schema = schema();
        let class = ClassId::new(2);
        let x = schema.field_by_name(class, "x").unwrap().id;
        let label = schema.field_by_name(class, "label").unwrap().id;
        let update = SetFields {
            object: ObjectId::new(3),
            fields: vec![(x, FieldValue::UInt32(5)), (label, FieldValue::from("a"))],
        };
        assert_eq!(SetFields::decode(&update.encode(), &schema).unwrap(), update);
    }

    #[test]
    fn test_fixed_bodies() {
        let eject = Eject {
            code: 122,
            reason: "bad hash".to_string(),
        };
        assert_eq!(Eject::decode(&eject.encode()).unwrap(), eject);

        let location = ObjectLocation {
            object: ObjectId::new(5),
            parent: ObjectId::new(6),
            zone: ZoneId::new(7),
        };
        assert_eq!(location.encode().len(), 12);
        assert_eq!(ObjectLocation::decode(&location.encode()).unwrap(), location);

        let interest = AddInterest {
            context: 0,
            interest: InterestId::new(4),
            parent: ObjectId::new(6),
            zone: ZoneId::new(7),
        };
        assert_eq!(interest.encode().len(), 14);
        assert_eq!(AddInterest::decode(&interest.encode()).unwrap(), interest);

        let done = InterestDone {
            context: 9,
            interest: InterestId::new(4),
        };
        assert_eq!(InterestDone::decode(&done.encode()).unwrap(), done);

        let control = ControlChannel {
            channel: ChannelId::new(4000),
        };
        assert_eq!(&control.encode()[..], &4000u64.to_le_bytes());

        assert_eq!(&ClientAgentState::Established.encode()[..], &[2, 0]);
        assert_eq!(
            ClientAgentState::decode(&[1, 0]).unwrap(),
            ClientAgentState::Anonymous
        );
        assert!(ClientAgentState::decode(&[9, 0]).is_err());

        let leaving = ObjectLeaving {
            object: ObjectId::new(12),
        };
        assert_eq!(ObjectLeaving::decode(&leaving.encode()).unwrap(), leaving);
        let delete = DeleteRam {
            object: ObjectId::new(12),
        };
        assert_eq!(DeleteRam::decode(&delete.encode()).unwrap(), delete);
    }
}
