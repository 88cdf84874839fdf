//! Error types for the replication core
//!
//! Errors are split by the layer that raises them so the dispatch loop can
//! decide whether a failure ends the connection or only the current message.

use crate::core::types::{ClassId, FieldId, ObjectId};
use thiserror::Error;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or truncated frames
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    /// Schema lookups and schema construction
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Field value bytes inconsistent with the declared type
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Field transform failures
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Connection and transport errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Mutation attempted on an object that was already deleted
    #[error("Object {object} has been deleted")]
    DeadEntity {
        /// Deleted object
        object: ObjectId,
    },

    /// No live object with that id in the repository
    #[error("Unknown object: {0}")]
    UnknownObject(ObjectId),

    /// The cluster ejected this connection
    #[error("Ejected by cluster (code {code}): {reason}")]
    Ejected {
        /// Eject code sent by the cluster
        code: u16,
        /// Human readable reason
        reason: String,
    },

    /// I/O errors from std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Prometheus metrics errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Internal system errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Frame level errors. Any of these ends the connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// Fewer bytes arrived than the length prefix declared
    #[error("Truncated frame: declared {declared} bytes, got {available}")]
    Truncated {
        /// Length from the prefix
        declared: usize,
        /// Bytes actually present
        available: usize,
    },

    /// Declared length too small to hold the dialect header
    #[error("Frame too short for header: {len} bytes (need {needed})")]
    TooShort {
        /// Declared length
        len: usize,
        /// Minimum header size
        needed: usize,
    },

    /// Encoded message does not fit the 16-bit length prefix
    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge {
        /// Body size in bytes
        size: usize,
        /// Maximum allowed body size in bytes
        max_size: usize,
    },

    /// More recipients than the 8-bit count can express
    #[error("Too many recipients: {0} (max 255)")]
    TooManyRecipients(usize),
}

/// Schema construction and lookup errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Field id not present in the schema
    #[error("Unknown field id {0}")]
    UnknownField(FieldId),

    /// Class id not present in the schema
    #[error("Unknown class id {0}")]
    UnknownClass(ClassId),

    /// Class name not present in the schema
    #[error("Unknown class '{0}'")]
    UnknownClassName(String),

    /// Struct name not present in the schema
    #[error("Unknown struct '{0}'")]
    UnknownStruct(String),

    /// Field exists but is not part of the class
    #[error("Field {field} does not belong to class {class}")]
    FieldNotInClass {
        /// Class of the object
        class: ClassId,
        /// Offending field
        field: FieldId,
    },

    /// Field name not found on a class, inherited fields included
    #[error("Class '{class}' has no field named '{field}'")]
    UnknownFieldName {
        /// Class name
        class: String,
        /// Field name
        field: String,
    },

    /// Parent referenced before (or without) being declared
    #[error("Class '{class}' inherits undeclared parent '{parent}'")]
    UnknownParent {
        /// Child class
        class: String,
        /// Missing parent
        parent: String,
    },

    /// Two declarations share a name
    #[error("Duplicate declaration '{0}'")]
    DuplicateName(String),

    /// Field id counter overflowed
    #[error("Too many fields: the field id space holds {max}")]
    TooManyFields {
        /// Capacity of the id space
        max: usize,
    },

    /// Class id counter overflowed
    #[error("Too many declarations: the class id space holds {max}")]
    TooManyClasses {
        /// Capacity of the id space
        max: usize,
    },

    /// Molecular atom name not found on the class
    #[error("Molecular field '{field}' references unknown atom '{atom}'")]
    UnknownAtom {
        /// Molecular field name
        field: String,
        /// Atom name
        atom: String,
    },

    /// Molecular atom is itself molecular
    #[error("Molecular field '{field}' references molecular field '{atom}'")]
    NestedMolecular {
        /// Molecular field name
        field: String,
        /// Atom name
        atom: String,
    },

    /// Inherited molecular field whose atom a subclass re-declared
    #[error("Class '{class}' shadows atom '{atom}' of inherited molecular field '{field}'")]
    ShadowedAtom {
        /// Declaring subclass
        class: String,
        /// Molecular field name
        field: String,
        /// Shadowed atom name
        atom: String,
    },

    /// Molecular field with no atoms
    #[error("Molecular field '{0}' has no atoms")]
    EmptyMolecular(String),

    /// Value does not match the field's declared type
    #[error("Value for field {field} does not match its type {expected}")]
    TypeMismatch {
        /// Target field
        field: FieldId,
        /// Declared type, rendered
        expected: String,
    },

    /// Default value does not match the field's declared type
    #[error("Default for field '{0}' does not match its type")]
    InvalidDefault(String),

    /// Wrong number of required values supplied for a class
    #[error("Class {class} needs {expected} required values, got {actual}")]
    RequiredCountMismatch {
        /// Class being created
        class: ClassId,
        /// Number of required fields
        expected: usize,
        /// Number supplied
        actual: usize,
    },

    /// Declaration file could not be read or parsed
    #[error("Invalid declaration file: {0}")]
    Declaration(String),
}

/// Value decode errors. These abort the message being dispatched only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended before the value was complete
    #[error("Truncated value: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes required
        needed: usize,
        /// Bytes left in the input
        remaining: usize,
    },

    /// String bytes are not valid UTF-8
    #[error("String is not valid UTF-8")]
    InvalidUtf8,

    /// Bytes left over after the message body was fully decoded
    #[error("{remaining} trailing bytes after message body")]
    TrailingBytes {
        /// Unread bytes
        remaining: usize,
    },

    /// A variable array's byte length does not end on an element boundary
    #[error("Array byte length {len} does not hold whole elements")]
    MisalignedArray {
        /// Declared byte length
        len: usize,
    },
}

/// Transform errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// Written-back value does not fit the integer type
    #[error("Value {value} is out of range for {target}")]
    OutOfRange {
        /// Value after the inverse transform
        value: f64,
        /// Target type, rendered
        target: String,
    },

    /// Transforms only apply to numeric fields
    #[error("Cannot transform a value of type {0}")]
    NotNumeric(String),

    /// Division or modulo by zero
    #[error("Transform operand must be non-zero")]
    ZeroOperand,
}

/// Network communication errors
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Connection failed or lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// Protocol violation
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Deadline passed while waiting
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// The repository has been closed
    #[error("Repository is closed")]
    Closed,
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(what: impl Into<String>) -> Self {
        Self::Network(NetworkError::Timeout(what.into()))
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Network(NetworkError::Connection(msg.into()))
    }

    /// Whether this error must end the connection.
    ///
    /// Framing, transport and eject errors are fatal. Schema, decode and
    /// transform errors only abort the message being handled.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Error::Framing(_)
                | Error::Io(_)
                | Error::Ejected { .. }
                | Error::Network(NetworkError::Connection(_))
                | Error::Network(NetworkError::Closed)
        )
    }

    /// Check if this is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Network(NetworkError::Timeout(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let framing = Error::from(FramingError::Truncated {
            declared: 10,
            available: 4,
        });
        assert!(framing.is_connection_fatal());

        let decode = Error::from(DecodeError::InvalidUtf8);
        assert!(!decode.is_connection_fatal());

        let schema = Error::from(SchemaError::UnknownField(FieldId::new(99)));
        assert!(!schema.is_connection_fatal());

        let eject = Error::Ejected {
            code: 122,
            reason: "bad hash".into(),
        };
        assert!(eject.is_connection_fatal());
    }

    #[test]
    fn test_timeout_helper() {
        let err = Error::timeout("field 3");
        assert!(err.is_timeout());
        assert!(!err.is_connection_fatal());
        assert_eq!(err.to_string(), "Network error: Timed out waiting for field 3");
    }
}
