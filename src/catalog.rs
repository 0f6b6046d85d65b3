use serde::Serialize;

/// A selectable functional area of the habitat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZoneType {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
}

/// Maximum number of distinct zones a single design may include.
pub const MAX_SELECTED_ZONES: usize = 6;

pub const ZONES: &[ZoneType] = &[
    ZoneType {
        id: "residential",
        name: "Residential",
        description: "Crew quarters, sleep stations and private space",
        icon: "bed",
    },
    ZoneType {
        id: "galley",
        name: "Galley",
        description: "Food preparation, storage and shared dining",
        icon: "utensils",
    },
    ZoneType {
        id: "hygiene",
        name: "Hygiene",
        description: "Waste collection, washing and personal care",
        icon: "droplets",
    },
    ZoneType {
        id: "exercise",
        name: "Exercise",
        description: "Countermeasure equipment for bone and muscle loss",
        icon: "dumbbell",
    },
    ZoneType {
        id: "medical",
        name: "Medical",
        description: "Diagnostics, treatment and medical supplies",
        icon: "stethoscope",
    },
    ZoneType {
        id: "laboratory",
        name: "Laboratory",
        description: "Science racks, sample handling and glovebox work",
        icon: "flask",
    },
    ZoneType {
        id: "command",
        name: "Command",
        description: "Mission operations, communications and monitoring",
        icon: "radio",
    },
    ZoneType {
        id: "storage",
        name: "Storage",
        description: "Logistics stowage and spare parts",
        icon: "package",
    },
    ZoneType {
        id: "maintenance",
        name: "Maintenance",
        description: "Repair workbench, tools and fabrication",
        icon: "wrench",
    },
    ZoneType {
        id: "hydroponics",
        name: "Hydroponics",
        description: "Plant growth systems for food and air revitalization",
        icon: "sprout",
    },
    ZoneType {
        id: "recreation",
        name: "Recreation",
        description: "Leisure, viewing port and group activities",
        icon: "gamepad",
    },
    ZoneType {
        id: "airlock",
        name: "Airlock",
        description: "EVA preparation, suit donning and dust mitigation",
        icon: "door",
    },
];

/// Look up a zone by id or display name (case-insensitive).
pub fn find_zone(query: &str) -> Option<&'static ZoneType> {
    let query = query.trim();
    ZONES
        .iter()
        .find(|z| z.id.eq_ignore_ascii_case(query) || z.name.eq_ignore_ascii_case(query))
}
