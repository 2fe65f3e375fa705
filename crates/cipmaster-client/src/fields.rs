//! Thread-safe field access on a shared outbound packet.
//!
//! The session loop snapshots the packet under the same mutex before every
//! send, so each call here is atomic with respect to the wire.

use crate::FieldError;
use cipmaster_core::codec::{HumanValue, WireValue};
use cipmaster_core::layout::FieldType;
use cipmaster_core::packet::PacketInstance;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type SharedPacket = Arc<Mutex<PacketInstance>>;

pub fn shared_packet(packet: PacketInstance) -> SharedPacket {
    Arc::new(Mutex::new(packet))
}

pub fn lock_packet(packet: &SharedPacket) -> MutexGuard<'_, PacketInstance> {
    packet.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Validates `value` through the field's codec and stores it. On failure the
/// packet keeps its previous contents.
pub fn set_field(packet: &SharedPacket, id: &str, value: &HumanValue) -> Result<(), FieldError> {
    lock_packet(packet).set(id, value)?;
    Ok(())
}

pub fn clear_field(packet: &SharedPacket, id: &str) -> Result<(), FieldError> {
    lock_packet(packet).clear(id)?;
    Ok(())
}

pub fn get_field(packet: &SharedPacket, id: &str) -> Result<HumanValue, FieldError> {
    Ok(lock_packet(packet).get(id)?)
}

/// Writes the heartbeat counter. Only `usint` fields are updated; any other
/// type is logged and left alone, reported as `Ok(false)`.
pub fn write_heartbeat(packet: &SharedPacket, id: &str, value: u8) -> Result<bool, FieldError> {
    let mut guard = lock_packet(packet);
    let field_type = guard.field(id)?.field_type;
    if field_type != FieldType::UInt8 {
        log::warn!("heartbeat field {id} is {field_type}, expected usint; not updated");
        return Ok(false);
    }
    guard.set_wire(id, &WireValue::U8(value))?;
    Ok(true)
}

/// One decoded field, as listed by [`snapshot`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FieldReading {
    pub id: String,
    pub field_type: String,
    pub value: String,
}

/// Decodes every declared field of `packet` in layout order.
pub fn snapshot(packet: &PacketInstance) -> Vec<FieldReading> {
    packet
        .layout()
        .declared_fields()
        .filter_map(|field| {
            let value = packet.get(&field.id).ok()?;
            Some(FieldReading {
                id: field.id.clone(),
                field_type: field.field_type.xml_tag().to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        clear_field, get_field, set_field, shared_packet, snapshot, write_heartbeat, SharedPacket,
    };
    use crate::FieldError;
    use cipmaster_core::codec::HumanValue;
    use cipmaster_core::layout::{AssemblyLayout, FieldSpec, FieldType};
    use cipmaster_core::packet::{PacketError, PacketInstance};
    use std::sync::Arc;

    fn packet() -> SharedPacket {
        let layout = AssemblyLayout::compile(
            vec![
                FieldSpec::new("MPU_CTCMSAlive", 0, FieldType::UInt8, 1),
                FieldSpec::new("Label", 8, FieldType::FixedString, 4),
                FieldSpec::new("Word", 48, FieldType::UInt16, 1),
                FieldSpec::new("MPU_CDateTimeSec", 64, FieldType::UInt32, 1),
            ],
            96,
        )
        .unwrap();
        shared_packet(PacketInstance::new(Arc::new(layout)))
    }

    #[test]
    fn byte_field_accepts_hex_and_rejects_out_of_range() {
        let packet = packet();
        set_field(&packet, "MPU_CTCMSAlive", &HumanValue::from("0xFF")).unwrap();
        assert_eq!(
            get_field(&packet, "MPU_CTCMSAlive").unwrap(),
            HumanValue::Int(255)
        );

        let err = set_field(&packet, "MPU_CTCMSAlive", &HumanValue::from("256")).unwrap_err();
        assert!(err.to_string().contains("expects a value within range"));
        let err = set_field(&packet, "MPU_CTCMSAlive", &HumanValue::from("abc")).unwrap_err();
        assert!(err.to_string().contains("format decimal or hex (0x00-0xFF)"));

        assert_eq!(
            get_field(&packet, "MPU_CTCMSAlive").unwrap(),
            HumanValue::Int(255)
        );
    }

    #[test]
    fn clear_resets_strings_and_numbers() {
        let packet = packet();
        set_field(&packet, "Label", &HumanValue::from("abcd")).unwrap();
        set_field(&packet, "Word", &HumanValue::Int(513)).unwrap();
        clear_field(&packet, "Label").unwrap();
        clear_field(&packet, "Word").unwrap();
        assert_eq!(
            get_field(&packet, "Label").unwrap(),
            HumanValue::Text(String::new())
        );
        assert_eq!(get_field(&packet, "Word").unwrap(), HumanValue::Int(0));
    }

    #[test]
    fn codecless_fields_cannot_be_set_but_can_be_read() {
        let packet = packet();
        let err = set_field(&packet, "MPU_CDateTimeSec", &HumanValue::Int(1)).unwrap_err();
        assert!(matches!(
            err,
            FieldError::Packet(PacketError::Unsupported { .. })
        ));
        assert!(clear_field(&packet, "MPU_CDateTimeSec").is_err());
        assert_eq!(
            get_field(&packet, "MPU_CDateTimeSec").unwrap(),
            HumanValue::Int(0)
        );
    }

    #[test]
    fn heartbeat_only_updates_usint_fields() {
        let packet = packet();
        assert!(write_heartbeat(&packet, "MPU_CTCMSAlive", 7).unwrap());
        assert_eq!(
            get_field(&packet, "MPU_CTCMSAlive").unwrap(),
            HumanValue::Int(7)
        );
        assert!(!write_heartbeat(&packet, "Word", 7).unwrap());
        assert_eq!(get_field(&packet, "Word").unwrap(), HumanValue::Int(0));
        assert!(write_heartbeat(&packet, "Missing", 1).is_err());
    }

    #[test]
    fn snapshot_skips_spare_fields() {
        let packet = packet();
        let guard = super::lock_packet(&packet);
        let ids: Vec<_> = snapshot(&guard).into_iter().map(|r| r.id).collect();
        assert_eq!(
            ids,
            vec!["MPU_CTCMSAlive", "Label", "Word", "MPU_CDateTimeSec"]
        );
    }
}
