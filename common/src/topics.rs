use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::ParseError;

pub const INVALID_TOPIC_MESSAGE: &str = "Invalid topic selected. Please choose a valid topic.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatTopic {
    Irrigation,
    SoilHealth,
    PestControl,
    CropManagement,
    GeneralAgriculture,
}

impl ChatTopic {
    pub const ALL: [ChatTopic; 5] = [
        Self::Irrigation,
        Self::SoilHealth,
        Self::PestControl,
        Self::CropManagement,
        Self::GeneralAgriculture,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::Irrigation => "irrigation",
            Self::SoilHealth => "soil_health",
            Self::PestControl => "pest_control",
            Self::CropManagement => "crop_management",
            Self::GeneralAgriculture => "general_agriculture",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Irrigation => "Irrigation Techniques",
            Self::SoilHealth => "Soil Health",
            Self::PestControl => "Pest Control",
            Self::CropManagement => "Crop Management",
            Self::GeneralAgriculture => "General Agriculture",
        }
    }

    pub fn focus(self) -> &'static str {
        match self {
            Self::Irrigation => "Discuss irrigation techniques, water usage, and scheduling.",
            Self::SoilHealth => "Discuss soil nutrients, pH levels, and soil improvement methods.",
            Self::PestControl => "Discuss pest management strategies and organic solutions.",
            Self::CropManagement => {
                "Discuss crop rotation, planting schedules, and yield optimization."
            }
            Self::GeneralAgriculture => {
                "General questions about agriculture and farming practices."
            }
        }
    }
}

impl FromStr for ChatTopic {
    type Err = ParseError;

    /// Exact key match only; display names are not accepted.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|topic| topic.key() == value)
            .ok_or_else(|| ParseError::UnknownTopic(value.to_string()))
    }
}

impl Serialize for ChatTopic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}
