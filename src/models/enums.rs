use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Every stored spelling, in declaration order.
            pub const ALL: &'static [&'static str] = &[$($s),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(EntityKind {
    Patient => "patient",
    Profile => "profile",
});

str_enum!(Sex {
    Male => "Masculino",
    Female => "Feminino",
    NonBinary => "Não Binário",
});

str_enum!(NoticeKind {
    AddressNotFound => "address_not_found",
    LookupFailed => "lookup_failed",
    RecordNotFound => "record_not_found",
    LoadFailed => "load_failed",
    ProfileMissing => "profile_missing",
    SaveFailed => "save_failed",
    Saved => "saved",
});
