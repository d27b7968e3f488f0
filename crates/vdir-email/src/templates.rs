//! Message bodies.
//!
//! Each template renders a plain text body and an HTML body from the same
//! context. Values substituted into HTML are escaped.

/// Subject of the contact verification message.
pub const VERIFY_CONTACT_SUBJECT: &str = "Verify Email Address";

/// Subject of the administrator review request.
pub const REVIEW_REQUEST_SUBJECT: &str = "Please Review TRISA TestNET VASP Registration Request";

/// Subject of the certificate delivery message.
pub const DELIVER_CERTIFICATE_SUBJECT: &str = "TRISA TestNet Certificate Issued";

/// A rendered text and HTML pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub html: String,
}

/// Escape `&`, `<`, `>`, `"` and `'` for inclusion in HTML.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub struct VerifyContact<'a> {
    pub name: &'a str,
    pub vasp_id: &'a str,
    pub token: &'a str,
}

impl VerifyContact<'_> {
    pub fn render(&self) -> Rendered {
        let text = format!(
            "Hello {name},\n\n\
             Thank you for registering with the TRISA TestNet directory. To start\n\
             verification of your registration, submit this token to the directory's\n\
             verify-email endpoint:\n\n\
             ID: {id}\n\
             Token: {token}\n\n\
             The token can be used once.\n\n\
             Best Regards,\n\
             The TRISA Directory Service",
            name = self.name,
            id = self.vasp_id,
            token = self.token,
        );
        let html = format!(
            "<p>Hello {name},</p>\n\
             <p>Thank you for registering with the TRISA TestNet directory. To start\n\
             verification of your registration, submit this token to the directory's\n\
             verify-email endpoint:</p>\n\
             <ul>\n\
             \t<li>ID: <strong>{id}</strong></li>\n\
             \t<li>Token: <strong>{token}</strong></li>\n\
             </ul>\n\
             <p>The token can be used once.</p>\n\
             <p>Best Regards,<br />\nThe TRISA Directory Service</p>",
            name = escape_html(self.name),
            id = escape_html(self.vasp_id),
            token = escape_html(self.token),
        );
        Rendered { text, html }
    }
}

pub struct ReviewRequest<'a> {
    pub vasp_id: &'a str,
    pub token: &'a str,
    /// Pretty-printed registration record.
    pub request: &'a str,
}

impl ReviewRequest<'_> {
    pub fn render(&self) -> Rendered {
        let text = format!(
            "Hello TRISA Admin,\n\n\
             A new registration has verified a contact email address and is ready\n\
             for review. Accept or reject it with the admin review endpoint using:\n\n\
             ID: {id}\n\
             Token: {token}\n\n\
             The registration request:\n\n\
             {request}\n\n\
             Best Regards,\n\
             The TRISA Directory Service",
            id = self.vasp_id,
            token = self.token,
            request = self.request,
        );
        let html = format!(
            "<p>Hello TRISA Admin,</p>\n\
             <p>A new registration has verified a contact email address and is ready\n\
             for review. Accept or reject it with the admin review endpoint using:</p>\n\
             <ul>\n\
             \t<li>ID: <strong>{id}</strong></li>\n\
             \t<li>Token: <strong>{token}</strong></li>\n\
             </ul>\n\
             <p>The registration request:</p>\n\
             <pre>{request}</pre>\n\
             <p>Best Regards,<br />\nThe TRISA Directory Service</p>",
            id = escape_html(self.vasp_id),
            token = escape_html(self.token),
            request = escape_html(self.request),
        );
        Rendered { text, html }
    }
}

pub struct DeliverCertificate<'a> {
    pub name: &'a str,
    pub vasp_id: &'a str,
    pub common_name: &'a str,
    pub filename: &'a str,
}

impl DeliverCertificate<'_> {
    pub fn render(&self) -> Rendered {
        let text = format!(
            "Hello {name},\n\n\
             The TRISA TestNet certificate for {cn} (VASP {id}) has been issued.\n\
             It is attached as {file}, a zip archive holding a PKCS#12 bundle\n\
             protected by the password created when the request was submitted.\n\n\
             Best Regards,\n\
             The TRISA Directory Service",
            name = self.name,
            cn = self.common_name,
            id = self.vasp_id,
            file = self.filename,
        );
        let html = format!(
            "<p>Hello {name},</p>\n\
             <p>The TRISA TestNet certificate for <strong>{cn}</strong> (VASP {id})\n\
             has been issued. It is attached as <code>{file}</code>, a zip archive\n\
             holding a PKCS#12 bundle protected by the password created when the\n\
             request was submitted.</p>\n\
             <p>Best Regards,<br />\nThe TRISA Directory Service</p>",
            name = escape_html(self.name),
            cn = escape_html(self.common_name),
            id = escape_html(self.vasp_id),
            file = escape_html(self.filename),
        );
        Rendered { text, html }
    }
}
