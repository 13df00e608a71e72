//! freedesktop.org `.desktop` entry for the URL handler.

use crate::SchemeRegistration;
use std::path::Path;

/// A hidden application entry that claims `x-scheme-handler/<scheme>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopEntry {
    pub file_name: String,
    pub content: String,
}

impl DesktopEntry {
    pub fn new(registration: &SchemeRegistration) -> Self {
        let file_name = format!(
            "{}-url-handler.desktop",
            registration.app_name.to_ascii_lowercase()
        );
        let exe = quote_exec_arg(&registration.exe.to_string_lossy());
        let content = format!(
            "[Desktop Entry]\n\
             Type=Application\n\
             Name={name}\n\
             Exec={exe} %u\n\
             Terminal=false\n\
             NoDisplay=true\n\
             MimeType={mime};\n",
            name = registration.app_name,
            exe = exe,
            mime = Self::mime_type(&registration.scheme),
        );
        Self { file_name, content }
    }

    pub fn mime_type(scheme: &str) -> String {
        format!("x-scheme-handler/{}", scheme)
    }
}

/// Quote one `Exec` argument.
///
/// Inside quotes `"`, `` ` ``, `$` and `\` take a backslash, and the string
/// value unescaping that runs first needs that backslash doubled. A literal
/// `%` is written `%%` so it is not read as a field code.
fn quote_exec_arg(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        match c {
            '"' | '`' | '$' => {
                quoted.push_str("\\\\");
                quoted.push(c);
            }
            '\\' => quoted.push_str("\\\\\\\\"),
            '%' => quoted.push_str("%%"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Write `content` to `path` unless it already holds exactly that.
/// Returns whether the file was written.
pub fn write_if_changed(path: &Path, content: &str) -> std::io::Result<bool> {
    if let Ok(existing) = std::fs::read_to_string(path) {
        if existing == content {
            return Ok(false);
        }
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(true)
}
