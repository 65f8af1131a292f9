//! Parser for LGS profile definition files.
//!
//! Definition files are XML documents in the Logitech "Cassandra"
//! namespaces. Matching is done on local tag names so namespace revisions
//! don't break parsing. The parser is a pure function of the file bytes
//! plus a device filter; the only side effect is reading the one file.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use roxmltree::{Document, Node};
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::model::{
    base_device_type, epoch, slot_key, Assignment, Macro, Profile, ANY_DEVICE,
};

/// Timestamp format of the `lastplayeddate` attribute.
const LAST_PLAYED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Memory-slot annotation syntax inside the profile description:
/// `[device.]M<slot>:<label>` pairs separated by `;`.
static STATE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:([a-z]+)\.)?M(\d):([^;]+)(?:;|$)").unwrap());

/// How much of a profile to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Identity, description, targets, last-used and file size only.
    /// Cheap; used for change classification.
    Header,
    /// Everything, including macros and device-filtered assignments.
    Full,
}

/// Errors raised while parsing a single definition file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed XML in {path}: {source}")]
    Xml {
        path: PathBuf,
        #[source]
        source: roxmltree::Error,
    },

    #[error("no 'profile' element in {path}")]
    MissingProfileElement { path: PathBuf },

    #[error("profile in {path} has an empty guid or name")]
    MissingIdentity { path: PathBuf },
}

/// Cheap header-only parse. See [`ParseMode::Header`].
pub fn parse_header(path: &Path) -> Result<Profile, ParseError> {
    parse_profile(path, &[], ParseMode::Header)
}

/// Full parse with macros and assignments for the filtered devices.
pub fn parse_full(path: &Path, device_filter: &[String]) -> Result<Profile, ParseError> {
    parse_profile(path, device_filter, ParseMode::Full)
}

/// Parses one profile definition file.
///
/// `device_filter` names the device types whose assignment blocks should
/// be extracted; blocks for other devices are skipped entirely. Filter
/// entries may carry a model suffix (`"Mouse.G700s"`), only the base type
/// is compared.
pub fn parse_profile(
    path: &Path,
    device_filter: &[String],
    mode: ParseMode,
) -> Result<Profile, ParseError> {
    debug!(path = %path.display(), ?mode, "Parsing profile");

    let text = fs::read_to_string(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file_size = fs::metadata(path)
        .map(|m| m.len())
        .map_err(|source| ParseError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let doc = Document::parse(&text).map_err(|source| ParseError::Xml {
        path: path.to_path_buf(),
        source,
    })?;

    let prof_el = doc
        .root_element()
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "profile")
        .ok_or_else(|| ParseError::MissingProfileElement {
            path: path.to_path_buf(),
        })?;

    let guid = prof_el.attribute("guid").unwrap_or_default();
    let name = prof_el.attribute("name").unwrap_or_default();
    if guid.is_empty() || name.is_empty() {
        return Err(ParseError::MissingIdentity {
            path: path.to_path_buf(),
        });
    }

    let mut profile = Profile::new(guid, name);
    profile.file_size = file_size;

    if let Some(lpd) = prof_el.attribute("lastplayeddate") {
        // The timestamp is untrusted input; an unparseable value keeps
        // the epoch default rather than failing the file.
        profile.last_used = NaiveDateTime::parse_from_str(lpd, LAST_PLAYED_FORMAT)
            .unwrap_or_else(|_| epoch());
    }

    if let Some(desc) = child_element(prof_el, "description") {
        profile.description = collect_text(desc);
        profile.state_names = parse_state_names(&profile.description);
    }

    for target in child_elements(prof_el, "target") {
        if let Some(tpath) = target.attribute("path") {
            if !tpath.is_empty() {
                profile.targets.push(tpath.to_string());
            }
        }
    }

    if mode == ParseMode::Header {
        return Ok(profile);
    }

    parse_macros(prof_el, &mut profile);
    parse_assignments(prof_el, device_filter, &mut profile);

    // Unresolved macro references must not dangle: drop them here so
    // consumers never need a second lookup to validate.
    for assigns in profile.assignments.values_mut() {
        assigns.retain(|_, a| profile_has_macro(&profile.macros, &a.macro_guid));
    }

    trace!(
        guid = %profile.guid,
        macros = profile.macros.len(),
        devices = profile.assignments.len(),
        "Parsed profile"
    );
    Ok(profile)
}

fn profile_has_macro(macros: &HashMap<String, Macro>, guid: &str) -> bool {
    macros.contains_key(guid)
}

fn parse_macros(prof_el: Node<'_, '_>, profile: &mut Profile) {
    let Some(macros_el) = child_element(prof_el, "macros") else {
        return;
    };
    for macro_el in child_elements(macros_el, "macro") {
        // Hidden macros and backup copies are not first-class entities.
        if macro_el.attribute("hidden") == Some("true") {
            continue;
        }
        if macro_el
            .attribute("backupguid")
            .is_some_and(|b| !b.is_empty())
        {
            continue;
        }
        let guid = macro_el.attribute("guid").unwrap_or_default();
        let name = macro_el.attribute("name").unwrap_or_default();
        let Some(content) = macro_el.children().find(roxmltree::Node::is_element) else {
            continue;
        };
        if guid.is_empty() || name.is_empty() {
            continue;
        }
        profile.macros.insert(
            guid.to_string(),
            Macro {
                guid: guid.to_string(),
                name: name.to_string(),
                kind: content.tag_name().name().to_string(),
            },
        );
    }
}

fn parse_assignments(prof_el: Node<'_, '_>, device_filter: &[String], profile: &mut Profile) {
    for block in child_elements(prof_el, "assignments") {
        // devicecategory is "Logitech.Gaming.<device_type>[.<model>]";
        // only the base device type is matched against the filter.
        let category = block.attribute("devicecategory").unwrap_or_default();
        let parts: Vec<&str> = category.split('.').collect();
        let Some(device) = parts.get(2) else {
            continue;
        };
        if !device_filter
            .iter()
            .any(|f| base_device_type(f) == *device)
        {
            continue;
        }

        let assigns = profile.assignments.entry((*device).to_string()).or_default();
        for assign_el in child_elements(block, "assignment") {
            if assign_el.attribute("backup") == Some("true") {
                continue;
            }
            let macro_guid = assign_el.attribute("macroguid").unwrap_or_default();
            if macro_guid.is_empty() {
                continue;
            }
            let key_id = assign_el.attribute("contextid").unwrap_or_default();
            let shift_state = assign_el
                .attribute("shiftstate")
                .and_then(|s| s.parse::<u8>().ok())
                .unwrap_or(1);
            let assignment = Assignment {
                macro_guid: macro_guid.to_string(),
                key_id: key_id.to_string(),
                shift_state,
            };
            assigns.insert(slot_key(key_id, shift_state), assignment);
        }
    }
}

/// Scrapes memory-slot display names from free-form description text.
///
/// Returns `{device-or-"any": {slot: label}}`. A pair without a device
/// prefix lands in the [`ANY_DEVICE`] scope.
pub fn parse_state_names(text: &str) -> HashMap<String, HashMap<u8, String>> {
    let mut names: HashMap<String, HashMap<u8, String>> = HashMap::new();
    for caps in STATE_NAME_RE.captures_iter(text) {
        let device = caps
            .get(1)
            .map_or_else(|| ANY_DEVICE.to_string(), |d| d.as_str().to_lowercase());
        let Some(slot) = caps.get(2).and_then(|s| s.as_str().parse::<u8>().ok()) else {
            continue;
        };
        let label = caps.get(3).map_or("", |l| l.as_str()).trim();
        if label.is_empty() {
            continue;
        }
        names.entry(device).or_default().insert(slot, label.to_string());
    }
    names
}

/// Parses every matching definition file in a directory, keyed by guid.
///
/// Files that fail to parse are logged and skipped; one broken file never
/// hides the rest. The scan is non-recursive.
pub fn parse_dir(dir: &Path, device_filter: &[String]) -> HashMap<String, Profile> {
    let mut profiles = HashMap::new();
    debug!(dir = %dir.display(), "Loading profiles");
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Cannot read profiles directory");
            return profiles;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("xml") {
            continue;
        }
        match parse_full(&path, device_filter) {
            Ok(profile) => {
                profiles.insert(profile.guid.clone(), profile);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unparseable profile"),
        }
    }
    profiles
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn child_elements<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

fn collect_text(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(roxmltree::Node::is_text)
        .filter_map(|n| n.text())
        .collect::<String>()
}
