//! Notification message composition.

use indoc::formatdoc;

use crate::alert::Alert;

/// Compose the SMS body for a triggered alert: kind, confidence, a map link
/// when a location fix exists, and the snapshot URL when one was attached.
pub fn compose_message(alert: &Alert) -> String {
    let location_line = alert
        .location
        .map(|l| l.maps_link())
        .unwrap_or_else(|| "Location unavailable".to_string());
    let confidence_pct = (alert.confidence * 100.0).round() as u32;
    let raised_at = alert
        .triggered_at
        .unwrap_or(alert.created_at)
        .format("%Y-%m-%d %H:%M:%S UTC");

    let mut body = formatdoc! {"
        EMERGENCY ALERT
        {label} (confidence {confidence_pct}%)
        Location: {location_line}
        Raised at {raised_at} -- alert #{id}
        ",
        label = alert.kind.label(),
        id = alert.id,
    };
    if let Some(url) = &alert.snapshot_url {
        body.push_str(&format!("Snapshot: {url}\n"));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertKind, AlertStatus, GeoPoint};
    use chrono::Utc;

    fn alert(location: Option<GeoPoint>, snapshot_url: Option<String>) -> Alert {
        Alert {
            id: 9,
            user_id: 1,
            session_id: None,
            kind: AlertKind::Scream,
            confidence: 0.92,
            status: AlertStatus::Triggered,
            location,
            snapshot_url,
            created_at: Utc::now(),
            triggered_at: Some(Utc::now()),
            cancelled_at: None,
        }
    }

    #[test]
    fn message_includes_kind_confidence_and_map_link() {
        let body = compose_message(&alert(
            Some(GeoPoint {
                lat: 48.85,
                lng: 2.35,
                accuracy_m: None,
            }),
            None,
        ));
        assert!(body.contains("Scream detected"));
        assert!(body.contains("92%"));
        assert!(body.contains("https://www.google.com/maps?q=48.85,2.35"));
        assert!(!body.contains("Snapshot"));
    }

    #[test]
    fn missing_location_is_called_out() {
        let body = compose_message(&alert(None, Some("https://cdn/snap.jpg".into())));
        assert!(body.contains("Location unavailable"));
        assert!(body.contains("Snapshot: https://cdn/snap.jpg"));
    }
}
