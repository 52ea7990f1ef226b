//! System theme detection and CSS variable generation.

use std::fmt;

/// System theme state (light or dark).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemTheme {
    /// Light appearance.
    Light,
    /// Dark appearance.
    Dark,
}

impl SystemTheme {
    /// Detect the current system theme.
    ///
    /// On macOS, this queries NSAppearance. On other platforms, defaults to Dark.
    pub fn current() -> Self {
        #[cfg(target_os = "macos")]
        {
            detect_macos_theme()
        }
        #[cfg(not(target_os = "macos"))]
        {
            Self::Dark
        }
    }

    /// Returns true if this is the dark theme.
    pub fn is_dark(self) -> bool {
        matches!(self, Self::Dark)
    }

    /// Returns true if this is the light theme.
    pub fn is_light(self) -> bool {
        matches!(self, Self::Light)
    }
}

impl fmt::Display for SystemTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Dark => write!(f, "dark"),
        }
    }
}

#[cfg(target_os = "macos")]
fn detect_macos_theme() -> SystemTheme {
    use objc2::msg_send;
    use objc2::rc::autoreleasepool;
    use objc2::runtime::AnyObject;
    use objc2_foundation::NSString;

    autoreleasepool(|_| {
        // Get the effective appearance name from NSApp
        let ns_app_class = objc2::class!(NSApplication);
        let ns_app: *mut AnyObject = unsafe { msg_send![ns_app_class, sharedApplication] };

        if ns_app.is_null() {
            // No NSApp available (shouldn't happen in GUI app, but be safe)
            return SystemTheme::Dark;
        }

        let effective_appearance: *mut AnyObject =
            unsafe { msg_send![ns_app, effectiveAppearance] };

        if effective_appearance.is_null() {
            return SystemTheme::Dark;
        }

        let name: *mut AnyObject = unsafe { msg_send![effective_appearance, name] };
        if name.is_null() {
            return SystemTheme::Dark;
        }

        // Convert NSString to Rust string
        let name_nsstring = unsafe { &*(name as *const NSString) };
        let name_str = name_nsstring.to_string();

        // Check if the name contains "Dark"
        if name_str.contains("Dark") {
            SystemTheme::Dark
        } else {
            SystemTheme::Light
        }
    })
}
