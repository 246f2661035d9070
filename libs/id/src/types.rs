//! Typed ID definitions.

use crate::define_uid;

// =============================================================================
// Claims
// =============================================================================

define_uid!(ClaimUid, "");

// =============================================================================
// Devices
// =============================================================================

define_uid!(DeviceUuid, "FAKE-");

impl DeviceUuid {
    /// Prefix of the lowercase resource name form.
    pub const RESOURCE_NAME_PREFIX: &'static str = "fake-";

    /// Returns the name under which the device is published as a named
    /// resource (`fake-<uuid>`).
    #[must_use]
    pub fn to_resource_name(&self) -> String {
        format!("{}{}", Self::RESOURCE_NAME_PREFIX, self.0)
    }

    /// Parses a device back from its resource name.
    pub fn from_resource_name(name: &str) -> Result<Self, crate::IdError> {
        if name.is_empty() {
            return Err(crate::IdError::Empty);
        }

        let Some(uuid_str) = name.strip_prefix(Self::RESOURCE_NAME_PREFIX) else {
            return Err(crate::IdError::MissingPrefix {
                expected: Self::RESOURCE_NAME_PREFIX,
                actual: name.to_string(),
            });
        };

        let uuid = crate::Uuid::parse_str(uuid_str)
            .map_err(|e| crate::IdError::InvalidUuid(e.to_string()))?;
        Ok(Self(uuid))
    }
}

// =============================================================================
// Tests
// =============================================================================
