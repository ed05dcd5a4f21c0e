//! Built-in pattern library shipped on first boot, scoped to what the
//! end-to-end scenarios need: a centrifugal pump, a wind turbine, and a
//! battery energy storage system. Not a general pattern-authoring
//! feature — operators add more patterns through the metadata store
//! directly.

use uuid::Uuid;

use flywheel_core::model::{Pattern, PatternRole};
use flywheel_core::Result;
use flywheel_store::MetadataStore;

/// Fixed namespace so seed pattern IDs are stable across restarts —
/// re-seeding never creates duplicate rows.
const SEED_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0x5e, 0x1a, 0x0d, 0x9f, 0x24, 0x4b, 0x2e, 0x8e, 0x3c, 0x2d, 0x6a, 0x71, 0x9b, 0x55, 0x01,
]);

fn seed_id(name: &str) -> Uuid {
    Uuid::new_v5(&SEED_NAMESPACE, name.as_bytes())
}

fn role(
    name: &str,
    required: bool,
    weight: f64,
    naming_patterns: &[&str],
    expected_unit: &str,
    expected_min: f64,
    expected_max: f64,
    typical_update_interval_secs: f64,
) -> PatternRole {
    PatternRole {
        name: name.to_string(),
        required,
        weight,
        naming_patterns: naming_patterns.iter().map(|s| s.to_string()).collect(),
        expected_unit: Some(expected_unit.to_string()),
        expected_min: Some(expected_min),
        expected_max: Some(expected_max),
        typical_update_interval_secs: Some(typical_update_interval_secs),
    }
}

pub fn seed_patterns() -> Vec<Pattern> {
    vec![
        Pattern {
            id: seed_id("centrifugal_pump"),
            name: "Centrifugal Pump".to_string(),
            category: "rotating_equipment".to_string(),
            description: "Single-stage centrifugal pump with discharge/suction pressure, flow, and motor current".to_string(),
            confidence: 0.70,
            active: true,
            example_count: 0,
            rejection_count: 0,
            last_matched_at: None,
            roles: vec![
                role("discharge_pressure", true, 0.30, &["dis.*press", "discharge.*pressure", "_dp$"], "psi", 0.0, 500.0, 5.0),
                role("suction_pressure", true, 0.25, &["suc.*press", "suction.*pressure", "_sp$"], "psi", -14.7, 200.0, 5.0),
                role("flow_rate", true, 0.25, &["flow.*rate", "_fr$", "flowrate", "flow"], "gpm", 0.0, 2000.0, 5.0),
                role("motor_current", false, 0.20, &["motor.*current", "_amps$", "current"], "A", 0.0, 200.0, 10.0),
            ],
        },
        Pattern {
            id: seed_id("horizontal_axis_wind_turbine"),
            name: "Horizontal Axis Wind Turbine".to_string(),
            category: "renewable_generation".to_string(),
            description: "Utility-scale HAWT with wind speed, rotor speed, power output, and blade pitch".to_string(),
            confidence: 0.70,
            active: true,
            example_count: 0,
            rejection_count: 0,
            last_matched_at: None,
            roles: vec![
                role("wind_speed", true, 0.25, &["wind.*speed", "_ws$"], "m/s", 0.0, 40.0, 1.0),
                role("rotor_speed", true, 0.25, &["rotor.*speed", "_rpm$", "rpm"], "rpm", 0.0, 20.0, 1.0),
                role("power_output", true, 0.30, &["power.*output", "_kw$", "active.*power", "power"], "kW", 0.0, 3000.0, 1.0),
                role("blade_pitch", false, 0.20, &["blade.*pitch", "pitch.*angle", "pitch"], "deg", 0.0, 90.0, 5.0),
            ],
        },
        Pattern {
            id: seed_id("battery_energy_storage"),
            name: "Battery Energy Storage".to_string(),
            category: "energy_storage".to_string(),
            description: "Grid-scale battery energy storage system with state of charge, voltage, current, and temperature".to_string(),
            confidence: 0.70,
            active: true,
            example_count: 0,
            rejection_count: 0,
            last_matched_at: None,
            roles: vec![
                role("state_of_charge", true, 0.30, &["state.*of.*charge", "_soc$"], "%", 0.0, 100.0, 10.0),
                role("battery_voltage", true, 0.25, &["battery.*voltage", "_vdc$", "pack.*voltage"], "V", 0.0, 800.0, 10.0),
                role("battery_current", true, 0.25, &["battery.*current", "_idc$", "pack.*current"], "A", -500.0, 500.0, 10.0),
                role("battery_temperature", false, 0.20, &["battery.*temp", "_temp$", "cell.*temperature"], "degC", -20.0, 60.0, 30.0),
            ],
        },
    ]
}

/// Idempotent first-boot seeding: only inserts patterns absent from the
/// store so a restart never clobbers confidence learned since the last
/// seed.
pub async fn ensure_seeded(metadata: &dyn MetadataStore) -> Result<usize> {
    let mut inserted = 0;
    for pattern in seed_patterns() {
        if metadata.get_pattern(pattern.id).await?.is_none() {
            metadata.upsert_pattern(pattern).await?;
            inserted += 1;
        }
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flywheel_store::InMemoryMetadataStore;

    #[test]
    fn seed_ids_are_stable_across_calls() {
        let a = seed_patterns();
        let b = seed_patterns();
        for (pa, pb) in a.iter().zip(b.iter()) {
            assert_eq!(pa.id, pb.id);
        }
    }

    #[tokio::test]
    async fn ensure_seeded_is_idempotent() {
        let metadata = InMemoryMetadataStore::new();
        let first = ensure_seeded(&metadata).await.unwrap();
        assert_eq!(first, 3);
        let second = ensure_seeded(&metadata).await.unwrap();
        assert_eq!(second, 0);
    }
}
