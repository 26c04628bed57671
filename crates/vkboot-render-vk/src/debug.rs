// SPDX-License-Identifier: CEPL-1.0
//! Validation-layer messages. The messenger subscribes broadly and the sink
//! decides what reaches the log.
use std::ffi::{c_void, CStr};

use ash::vk;
use tracing::Level;

pub(crate) fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

/// Level a message is logged at, or `None` if the sink drops it.
pub fn sink_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Option<Level> {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Some(Level::ERROR)
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Some(Level::WARN)
    } else {
        None
    }
}

fn type_label(types: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if types.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if types.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else if types.contains(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL) {
        "general"
    } else {
        "unknown"
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    let Some(level) = sink_level(severity) else {
        return vk::FALSE;
    };
    if data.is_null() {
        return vk::FALSE;
    }
    // SAFETY: the loader passes a valid callback-data struct for the duration of the call
    let p_message = unsafe { (*data).p_message };
    if p_message.is_null() {
        return vk::FALSE;
    }
    // SAFETY: p_message is a NUL-terminated string owned by the loader
    let message = unsafe { CStr::from_ptr(p_message) }.to_string_lossy();

    let kind = type_label(types);
    if level == Level::ERROR {
        tracing::error!(target: "vkboot::validation", "validation layer: type {kind} msg: {message}");
    } else {
        tracing::warn!(target: "vkboot::validation", "validation layer: type {kind} msg: {message}");
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_forwards_only_warning_and_error() {
        type S = vk::DebugUtilsMessageSeverityFlagsEXT;
        assert_eq!(sink_level(S::VERBOSE), None);
        assert_eq!(sink_level(S::INFO), None);
        assert_eq!(sink_level(S::WARNING), Some(Level::WARN));
        assert_eq!(sink_level(S::ERROR), Some(Level::ERROR));
    }

    #[test]
    fn subscription_is_broader_than_sink() {
        let info = messenger_create_info();
        assert!(info
            .message_severity
            .contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE));
        assert!(info.pfn_user_callback.is_some());
    }

    #[test]
    fn callback_ignores_null_data() {
        // SAFETY: a null data pointer is handled before any dereference
        let ret = unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                std::ptr::null(),
                std::ptr::null_mut(),
            )
        };
        assert_eq!(ret, vk::FALSE);
    }

    #[test]
    fn type_labels() {
        assert_eq!(
            type_label(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE),
            "performance"
        );
        assert_eq!(
            type_label(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            ),
            "validation"
        );
    }
}
