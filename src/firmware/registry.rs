//! Process-wide table of format names to constructors.
//!
//! Manifests name the format of nested images with a `gtype` attribute; the
//! registry turns that name back into a fresh format object. The built-in
//! formats are registered on first use.

use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

use super::format::{FirmwareFormat, RawFirmware};
use crate::error::{Error, Result};
use crate::formats::{AcpiTable, IhexFirmware};

pub type FormatConstructor = fn() -> Box<dyn FirmwareFormat>;

static REGISTRY: OnceLock<RwLock<HashMap<&'static str, FormatConstructor>>> = OnceLock::new();

/// Constructor for any defaultable format, e.g. `construct::<AcpiTable>`.
pub fn construct<T: FirmwareFormat + Default>() -> Box<dyn FirmwareFormat> {
    Box::new(T::default())
}

fn registry() -> &'static RwLock<HashMap<&'static str, FormatConstructor>> {
    REGISTRY.get_or_init(|| {
        let builtin: [FormatConstructor; 3] = [
            construct::<RawFirmware>,
            construct::<AcpiTable>,
            construct::<IhexFirmware>,
        ];
        let map = builtin.into_iter().map(|ctor| (ctor().type_name(), ctor)).collect();
        RwLock::new(map)
    })
}

/// Registers a format under its [`FirmwareFormat::type_name`], replacing any
/// earlier registration of the same name.
pub fn register_format(ctor: FormatConstructor) {
    let name = ctor().type_name();
    log::debug!("registering firmware format {name}");
    registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(name, ctor);
}

pub fn lookup_format(name: &str) -> Result<FormatConstructor> {
    registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
        .copied()
        .ok_or_else(|| Error::NotFound(format!("firmware type {name} not registered")))
}

pub fn registered_formats() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .keys()
        .copied()
        .collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Custom;

    impl FirmwareFormat for Custom {
        fn type_name(&self) -> &'static str {
            "RegistryTestCustom"
        }
    }

    #[test]
    fn builtins_are_present() {
        let names = registered_formats();
        for name in ["FuFirmware", "FuAcpiTable", "FuIhexFirmware"] {
            assert!(names.contains(&name), "{name} missing");
        }
        assert_eq!(lookup_format("FuAcpiTable").unwrap()().type_name(), "FuAcpiTable");
    }

    #[test]
    fn unknown_name_is_not_found() {
        assert!(matches!(lookup_format("FuNoSuchFirmware"), Err(Error::NotFound(_))));
    }

    #[test]
    fn register_custom_format() {
        register_format(construct::<Custom>);
        assert_eq!(lookup_format("RegistryTestCustom").unwrap()().type_name(), "RegistryTestCustom");
    }
}
