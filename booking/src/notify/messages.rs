//! Reminder and follow-up message content.

use crate::types::ReservationId;

/// Rendered notification content, usable for push and email.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Push title and email subject
    pub title: String,
    /// Push body and plain-text email body
    pub text: String,
    /// HTML email body
    pub html: String,
}

/// Link a guest follows to confirm arrival.
#[must_use]
pub fn check_in_url(base_url: &str, reservation_id: ReservationId) -> String {
    format!("{base_url}?reservationId={reservation_id}")
}

/// Upcoming reservation reminder.
#[must_use]
pub fn reminder(venue_name: &str, minutes_to_start: i64) -> Message {
    let minutes = minutes_to_start.max(1);
    let unit = if minutes == 1 { "minute" } else { "minutes" };
    let text = format!("Your reservation at {venue_name} is in {minutes} {unit}. Please get ready!");
    Message {
        title: "Reservation Reminder".to_string(),
        html: format!("<p>{text}</p>"),
        text,
    }
}

/// "Did you arrive" message carrying the check-in link.
#[must_use]
pub fn follow_up(venue_name: &str, check_in_url: &str) -> Message {
    Message {
        title: format!("Did you arrive at {venue_name}?"),
        text: format!("Please let us know if you have arrived: {check_in_url}"),
        html: format!(
            "<p>Please let us know if you've arrived at {venue_name} by clicking the link below.</p>\
             <a href=\"{check_in_url}\">Click here to confirm your arrival</a>"
        ),
    }
}
