use crate::students::Student;

/// Output formats the profile renderer understands. No PDF backend is
/// wired into this build, so a pdf request degrades to the HTML card and
/// the caller is told which format it actually got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfileFormat {
    #[default]
    Html,
    Pdf,
}

impl ProfileFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ProfileFormat::Html => "html",
            ProfileFormat::Pdf => "pdf",
        }
    }

    pub fn parse(s: &str) -> Option<ProfileFormat> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Some(ProfileFormat::Html),
            "pdf" => Some(ProfileFormat::Pdf),
            _ => None,
        }
    }
}

/// The format a render request will actually produce.
pub fn effective_format(requested: ProfileFormat) -> ProfileFormat {
    match requested {
        ProfileFormat::Pdf => ProfileFormat::Html,
        f => f,
    }
}

/// Printable profile summary card as a self-contained HTML fragment.
pub fn profile_card_html(s: &Student) -> String {
    let mut html = String::from(
        "<div style=\"font-family:Arial,Helvetica,sans-serif;max-width:700px;margin:0 auto;\">",
    );
    html.push_str("<h2>Profile Summary Report</h2>");
    push_row(&mut html, "Full Name", &s.full_name);
    push_row(&mut html, "Student ID", &s.student_id);
    push_row(&mut html, "Email", &s.email);
    push_row(&mut html, "Date of Birth", s.dob.as_deref().unwrap_or(""));
    push_row(&mut html, "Course", s.course.as_deref().unwrap_or(""));
    push_row(
        &mut html,
        "Enrollment Date",
        s.enrollment_date.as_deref().unwrap_or(""),
    );
    push_row(&mut html, "Status", s.status.as_str());
    html.push_str("</div>");
    html
}

/// Registration confirmation slip, stamped with its generation time.
pub fn registration_slip_html(s: &Student, generated_at: &str) -> String {
    let mut html = String::from(
        "<div style=\"border:1px dashed #333;padding:16px;max-width:700px;margin:0 auto;\">",
    );
    html.push_str("<h2>Registration Confirmation Slip</h2>");
    push_row(&mut html, "Generated", generated_at);
    push_row(&mut html, "Name", &s.full_name);
    push_row(&mut html, "Student ID", &s.student_id);
    push_row(&mut html, "Course", s.course.as_deref().unwrap_or(""));
    push_row(&mut html, "Status", s.status.as_str());
    html.push_str("</div>");
    html
}

fn push_row(html: &mut String, label: &str, value: &str) {
    html.push_str("<p><strong>");
    html.push_str(label);
    html.push_str(":</strong> ");
    html.push_str(&escape_html(value));
    html.push_str("</p>");
}

fn escape_html(v: &str) -> String {
    let mut out = String::with_capacity(v.len());
    for c in v.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}
