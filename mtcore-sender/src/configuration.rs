// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
const DEFAULT_LOCALE: &str = "en";

/// Connection identity sent to the server when a session is initialized
/// (the `initConnection` envelope a caller's generated schema wraps its
/// first request in). This crate only carries the values; wrapping an
/// outgoing request with them is the caller's responsibility, since doing
/// so requires a type from the caller's own schema.
pub struct Configuration {
    /// `api_id` obtained from https://my.telegram.org. There is no sane
    /// default; callers must set this explicitly.
    pub api_id: i32,
    /// "Device model" according to [`initConnection`](https://core.telegram.org/method/initConnection).
    pub device_model: String,
    /// "Operation system version" according to [`initConnection`](https://core.telegram.org/method/initConnection).
    pub system_version: String,
    /// "Application version" according to [`initConnection`](https://core.telegram.org/method/initConnection).
    pub app_version: String,
    /// Code for the language used on the device's OS, formatted using the ISO 639-1 standard.
    pub system_lang_code: String,
    /// Either an ISO 639-1 language code or a language pack name obtained from
    /// a [language pack link](https://core.telegram.org/api/links#language-pack-links).
    pub lang_code: String,
    /// Whether to connect to Telegram's test data centers instead of the
    /// production ones (§4.3.5 uses this to pick the right address table).
    pub test_mode: bool,
    #[doc(hidden)]
    pub __non_exhaustive: (),
}

impl Default for Configuration {
    fn default() -> Self {
        let info = os_info::get();

        let mut system_lang_code = String::new();
        let mut lang_code = String::new();

        #[cfg(not(target_os = "android"))]
        {
            system_lang_code.push_str(&locate_locale::system());
            lang_code.push_str(&locate_locale::user());
        }
        if system_lang_code.is_empty() {
            system_lang_code.push_str(DEFAULT_LOCALE);
        }
        if lang_code.is_empty() {
            lang_code.push_str(DEFAULT_LOCALE);
        }

        Self {
            api_id: 0,
            device_model: format!("{} {}", info.os_type(), info.bitness()),
            system_version: info.version().to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            system_lang_code,
            lang_code,
            test_mode: false,
            __non_exhaustive: (),
        }
    }
}
