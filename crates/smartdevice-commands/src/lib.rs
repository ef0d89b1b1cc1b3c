//! Command dispatch and data conversion for device plugins.
//!
//! Provides:
//! - Datatype converters and device-family converter catalogues
//! - Value bounds and opcode templates
//! - Lookup tables between device tokens and logical values
//! - The command registry built from a family configuration document

pub mod bounds;
pub mod command;
pub mod config;
pub mod datatype;
pub mod error;
pub mod family;
pub mod lookup;
pub mod registry;
pub mod template;

// Re-exports
pub use bounds::{Bounds, Range};

pub use command::{Command, CommandKind, REGEX_TOKEN};

pub use config::{CommandConfig, FamilyConfig, ReplyToken};

pub use datatype::{Datatype, DatatypeKind};

pub use error::{CommandError, ConfigError, ConversionError, Result, TemplateError};

pub use family::DeviceFamily;

pub use lookup::{LookupTable, LookupView};

pub use registry::{CommandRegistry, RegistryOptions};
