//! Reservation ticket email template

use askama::Template;

use super::Reservation;

/// One extra reservation field shown on the ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketDetail {
    /// The field name as sent on the queue
    pub label: String,

    /// The field value, formatted for display
    pub value: String,
}

/// Reservation ticket template
///
/// Rendered as HTML with every value escaped, except `qrcode` which is built
/// by us (a `data:` URI or a `cid:` reference).
#[derive(Debug, Template)]
#[template(path = "emails/tickets/reservation.html")]
pub struct ReservationTicketTemplate {
    /// The reservation identifier
    pub reservation_id: String,

    /// The member the ticket is addressed to
    pub member_email: String,

    /// The `src` of the QR image
    pub qrcode: String,

    /// Every other field of the reservation message
    pub details: Vec<TicketDetail>,
}

impl ReservationTicketTemplate {
    /// Creates a new `ReservationTicketTemplate`
    pub fn new(reservation: &Reservation, qrcode: String) -> Self {
        Self {
            reservation_id: reservation.id.to_string(),
            member_email: reservation.member_email.to_string(),
            qrcode,
            details: reservation
                .display_details()
                .into_iter()
                .map(|(label, value)| TicketDetail { label, value })
                .collect(),
        }
    }

    /// Renders the plain text version of the email
    pub fn render_plain(&self) -> String {
        let mut plain = format!(
            "예약이 완료되었습니다.\n\n예약 번호: {id}\n예약자: {email}\n",
            id = self.reservation_id,
            email = self.member_email
        );

        for detail in &self.details {
            plain.push_str(&format!("{}: {}\n", detail.label, detail.value));
        }

        plain.push_str("\n입장 시 QR 코드를 제시해 주세요.\n");
        plain
    }
}
