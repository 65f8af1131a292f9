//! Game-profile data model and definition-file parser.

mod model;
mod parser;

pub use model::{
    base_device_type, device_layout, epoch, slot_key, Assignment, DeviceLayout, Macro, Profile,
    ANY_DEVICE, DEFAULT_PROFILE_NAME, DEVICE_LAYOUTS,
};
pub use parser::{
    parse_dir, parse_full, parse_header, parse_profile, parse_state_names, ParseError, ParseMode,
};
