//! Concrete firmware formats built on [`FirmwareFormat`](crate::firmware::FirmwareFormat).

mod acpi;
mod intel_hex;

pub use acpi::AcpiTable;
pub use intel_hex::IhexFirmware;
