//! HTML bodies for template and registration mail.

/// A named wrapper around caller-supplied HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Welcome,
    Notification,
    Report,
}

impl Template {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "welcome" => Some(Self::Welcome),
            "notification" => Some(Self::Notification),
            "report" => Some(Self::Report),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::Notification => "notification",
            Self::Report => "report",
        }
    }

    /// Wraps `body` verbatim; it is expected to be HTML already.
    pub fn render(self, body: &str) -> String {
        match self {
            Self::Welcome => format!(
                "<h1>Welcome to our community!</h1>\n\
                 <p>Dear user:</p>\n\
                 <p>{body}</p>\n\
                 <p>Enjoy your time with us!</p>\n"
            ),
            Self::Notification => format!(
                "<div style=\"background-color: #f5f5f5; padding: 20px;\">\n\
                 <h2>System Notification</h2>\n\
                 <p>{body}</p>\n\
                 </div>\n"
            ),
            Self::Report => format!(
                "<div style=\"border: 1px solid #ddd; padding: 15px;\">\n\
                 <h2>Report Summary</h2>\n\
                 <div>{body}</div>\n\
                 </div>\n"
            ),
        }
    }
}

pub const WELCOME_SUBJECT: &str = "Welcome to our community!";
pub const FOLLOW_UP_SUBJECT: &str = "How are you finding our service?";

pub fn registration_welcome(username: &str) -> String {
    let username = escape_html(username);
    format!(
        "<h1>Welcome {username}!</h1>\n\
         <p>Thank you for registering.</p>\n\
         <p>If you have any questions, feel free to contact our support team.</p>\n"
    )
}

pub fn registration_follow_up(username: &str) -> String {
    let username = escape_html(username);
    format!(
        "<h2>Dear {username}:</h2>\n\
         <p>We hope you've enjoyed your experience over the last few days.</p>\n\
         <p>We would love to hear your feedback, please reply directly to this email with any suggestions.</p>\n"
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
