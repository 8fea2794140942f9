//! Realm enumerations as carried on the wire.

use crate::error::PayloadError;

/// Declares a `u8`-backed enum with checked conversion from its wire value.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident : $field:literal {
            $($variant:ident = $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($variant = $value),+
        }

        impl $name {
            pub fn from_wire(value: u8) -> Result<Self, PayloadError> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(PayloadError::InvalidValue {
                        field: $field,
                        value: u32::from(other),
                    }),
                }
            }

            pub fn to_wire(self) -> u8 {
                self as u8
            }
        }
    };
}

wire_enum! {
    /// Kind of game world a realm runs.
    RealmType: "type" {
        Normal = 0,
        Pvp = 1,
        Normal2 = 4,
        Rp = 6,
        RpPvp = 8,
        FfaPvp = 16,
    }
}

wire_enum! {
    /// Realm zone; decides which client locales may see the realm.
    Timezone: "timezone" {
        Unknown = 0,
        Development = 1,
        UnitedStates = 2,
        Oceanic = 3,
        LatinAmerica = 4,
        Tournament5 = 5,
        Korea = 6,
        Tournament7 = 7,
        English = 8,
        German = 9,
        French = 10,
        Spanish = 11,
        Russian = 12,
        Tournament13 = 13,
        Taiwan = 14,
        Tournament15 = 15,
        China = 16,
        Cn1 = 17,
        Cn2 = 18,
        Cn3 = 19,
        Cn4 = 20,
        Cn5 = 21,
        Cn6 = 22,
        Cn7 = 23,
        Cn8 = 24,
        Tournament25 = 25,
        TestServer = 26,
        Tournament27 = 27,
        QaServer = 28,
        Cn9 = 29,
    }
}

wire_enum! {
    /// Account security level. Also the minimum level a realm admits.
    AccessLevel: "min_access_level" {
        Player = 0,
        Moderator = 1,
        GameMaster = 2,
        Administrator = 3,
        Console = 4,
    }
}

/// Realm status bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct RealmFlags(u8);

impl RealmFlags {
    pub const NONE: RealmFlags = RealmFlags(0x00);
    pub const INVALID: RealmFlags = RealmFlags(0x01);
    pub const OFFLINE: RealmFlags = RealmFlags(0x02);
    pub const SPECIFY_BUILD: RealmFlags = RealmFlags(0x04);
    pub const NEW_PLAYERS: RealmFlags = RealmFlags(0x20);
    pub const RECOMMENDED: RealmFlags = RealmFlags(0x40);
    pub const FULL: RealmFlags = RealmFlags(0x80);

    pub const fn from_bits(bits: u8) -> Self {
        RealmFlags(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: RealmFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_offline(self) -> bool {
        self.contains(RealmFlags::OFFLINE)
    }

    #[must_use]
    pub const fn with(self, other: RealmFlags) -> Self {
        RealmFlags(self.0 | other.0)
    }

    #[must_use]
    pub const fn without(self, other: RealmFlags) -> Self {
        RealmFlags(self.0 & !other.0)
    }
}
