//! Email message

use crate::domain::communication::email_addresses::EmailAddress;

/// An image shipped inside the email and referenced from the HTML as `cid:<content_id>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    /// The `Content-ID` of the part, without angle brackets
    pub content_id: String,

    /// The MIME type of the image, e.g. `image/png`
    pub content_type: String,

    /// The raw image bytes
    pub data: Vec<u8>,
}

/// Email message
#[derive(Debug, Clone)]
pub struct Message {
    /// The recipient of the email
    pub to: EmailAddress,

    /// The sender of the email, the mailer's default sender when `None`
    pub from: Option<EmailAddress>,

    /// The subject of the email
    pub subject: String,

    /// The HTML body of the email
    pub html_body: String,

    /// The plain text body of the email
    pub plain_body: String,

    /// Images attached inline next to the HTML body
    pub inline_images: Vec<InlineImage>,
}

impl Message {
    /// Creates a message without inline images, sent from the default sender
    pub fn new(to: EmailAddress, subject: &str, html_body: String, plain_body: String) -> Self {
        Self {
            to,
            from: None,
            subject: subject.to_string(),
            html_body,
            plain_body,
            inline_images: Vec::new(),
        }
    }

    /// Adds an inline image to the message
    pub fn with_inline_image(mut self, image: InlineImage) -> Self {
        self.inline_images.push(image);
        self
    }
}
