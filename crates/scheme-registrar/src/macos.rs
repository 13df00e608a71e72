//! macOS registration through LaunchServices.
//!
//! The bundle's Info.plist declares the scheme; this only makes the bundle
//! the default handler when another app has claimed it.

use crate::{RegistrarError, RegistrarResult, Registration, SchemeRegistration};
use core_foundation::base::TCFType;
use core_foundation::string::{CFString, CFStringRef};

#[link(name = "CoreServices", kind = "framework")]
extern "C" {
    fn LSSetDefaultHandlerForURLScheme(scheme: CFStringRef, bundle_id: CFStringRef) -> i32;
    fn LSCopyDefaultHandlerForURLScheme(scheme: CFStringRef) -> CFStringRef;
}

pub fn register(registration: &SchemeRegistration) -> RegistrarResult<Registration> {
    let scheme = CFString::new(&registration.scheme);
    let bundle_id = CFString::new(&registration.app_id);

    // SAFETY: both arguments are live CFStrings; the copy follows the create rule.
    let current = unsafe {
        let handler = LSCopyDefaultHandlerForURLScheme(scheme.as_concrete_TypeRef());
        (!handler.is_null()).then(|| CFString::wrap_under_create_rule(handler).to_string())
    };
    if current
        .as_deref()
        .is_some_and(|id| id.eq_ignore_ascii_case(&registration.app_id))
    {
        return Ok(Registration::AlreadyCurrent);
    }

    // SAFETY: both arguments are live CFStrings.
    let status = unsafe {
        LSSetDefaultHandlerForURLScheme(
            scheme.as_concrete_TypeRef(),
            bundle_id.as_concrete_TypeRef(),
        )
    };
    if status != 0 {
        return Err(RegistrarError::Platform(format!(
            "LSSetDefaultHandlerForURLScheme returned {}",
            status
        )));
    }
    Ok(Registration::Registered)
}
