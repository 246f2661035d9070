//! The `define_uid!` macro behind every identifier in this crate.

/// Define a `Copy` newtype over [`uuid::Uuid`] whose string form is
/// `$prefix` followed by the hyphenated UUID.
///
/// The string form is used for `Display`, `FromStr` and serde, so IDs can
/// key JSON maps directly. An empty prefix gives a bare UUID.
///
/// ```ignore
/// define_uid!(ClaimUid, "");
/// define_uid!(DeviceUuid, "FAKE-");
///
/// let device: DeviceUuid = "FAKE-0b7f5a8e-2c1d-4f4e-9d55-3a1b2c3d4e5f".parse()?;
/// ```
#[macro_export]
macro_rules! define_uid {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($crate::Uuid);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Random (v4) ID.
            #[must_use]
            pub fn new() -> Self {
                Self($crate::Uuid::new_v4())
            }

            #[must_use]
            pub const fn from_uuid(uuid: $crate::Uuid) -> Self {
                Self(uuid)
            }

            #[must_use]
            pub const fn uuid(&self) -> $crate::Uuid {
                self.0
            }

            /// Parse `{prefix}{uuid}`; the prefix is case-sensitive.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                if s.is_empty() {
                    return Err($crate::IdError::Empty);
                }

                let Some(uuid_str) = s.strip_prefix(Self::PREFIX) else {
                    return Err($crate::IdError::MissingPrefix {
                        expected: Self::PREFIX,
                        actual: s.to_string(),
                    });
                };

                let uuid = $crate::Uuid::parse_str(uuid_str)
                    .map_err(|e| $crate::IdError::InvalidUuid(e.to_string()))?;

                Ok(Self(uuid))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", Self::PREFIX, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }

        impl AsRef<$crate::Uuid> for $name {
            fn as_ref(&self) -> &$crate::Uuid {
                &self.0
            }
        }
    };
}
