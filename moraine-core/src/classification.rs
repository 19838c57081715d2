use std::convert::TryFrom;

use crate::error::MoraineError;

/// Classification code of a single point, following the ASPRS LAS code points
/// for the classes moraine works with.
///
/// The set is closed: every value written into a
/// [PointCloudBuffer](crate::containers::PointCloudBuffer) classification column
/// is one of these codes. Codes not in this set (e.g. the LAS reserved range)
/// are rejected at the buffer boundary.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClassCode {
    Unclassified = 0,
    Ground = 2,
    LowVegetation = 3,
    MediumVegetation = 4,
    HighVegetation = 5,
    Building = 6,
    Water = 9,
}

impl ClassCode {
    /// All codes in the closed set, in ascending code order
    pub const ALL: [ClassCode; 7] = [
        ClassCode::Unclassified,
        ClassCode::Ground,
        ClassCode::LowVegetation,
        ClassCode::MediumVegetation,
        ClassCode::HighVegetation,
        ClassCode::Building,
        ClassCode::Water,
    ];

    /// Returns the code for the given raw value, or `None` if the value is not
    /// part of the closed set
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ClassCode::Unclassified),
            2 => Some(ClassCode::Ground),
            3 => Some(ClassCode::LowVegetation),
            4 => Some(ClassCode::MediumVegetation),
            5 => Some(ClassCode::HighVegetation),
            6 => Some(ClassCode::Building),
            9 => Some(ClassCode::Water),
            _ => None,
        }
    }

    /// The raw LAS code of this class
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Returns true for the three vegetation tiers
    pub fn is_vegetation(self) -> bool {
        matches!(
            self,
            ClassCode::LowVegetation | ClassCode::MediumVegetation | ClassCode::HighVegetation
        )
    }
}

impl TryFrom<u8> for ClassCode {
    type Error = MoraineError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        ClassCode::from_code(code).ok_or_else(|| {
            MoraineError::invalid_input(format!("classification code {} is not supported", code))
        })
    }
}

impl From<ClassCode> for u8 {
    fn from(class: ClassCode) -> u8 {
        class.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_codes_round_trip() {
        for class in ClassCode::ALL.iter().copied() {
            assert_eq!(Some(class), ClassCode::from_code(class.code()));
        }
    }

    #[test]
    fn codes_outside_the_set_are_rejected() {
        for code in [1u8, 7, 8, 10, 255].iter().copied() {
            assert!(ClassCode::from_code(code).is_none());
            assert!(ClassCode::try_from(code).is_err());
        }
    }

    #[test]
    fn vegetation_tiers() {
        assert!(ClassCode::LowVegetation.is_vegetation());
        assert!(ClassCode::HighVegetation.is_vegetation());
        assert!(!ClassCode::Ground.is_vegetation());
        assert!(!ClassCode::Water.is_vegetation());
    }
}
