//! NTSTATUS translation and Win32 error text
//!
//! Loader snaps report NTSTATUS values while the instrumentation log and the
//! summaries speak Win32 error codes. Only the statuses the loader actually
//! returns are mapped; anything else follows the OS fallback of
//! `ERROR_MR_MID_NOT_FOUND`.

pub const ERROR_SUCCESS: u32 = 0;
pub const ERROR_FILE_NOT_FOUND: u32 = 2;
pub const ERROR_PATH_NOT_FOUND: u32 = 3;
pub const ERROR_ACCESS_DENIED: u32 = 5;
pub const ERROR_NOT_ENOUGH_MEMORY: u32 = 8;
pub const ERROR_INVALID_PARAMETER: u32 = 87;
pub const ERROR_MOD_NOT_FOUND: u32 = 126;
pub const ERROR_PROC_NOT_FOUND: u32 = 127;
pub const ERROR_INVALID_ORDINAL: u32 = 182;
pub const ERROR_BAD_EXE_FORMAT: u32 = 193;
pub const ERROR_MR_MID_NOT_FOUND: u32 = 317;
pub const ERROR_INVALID_IMAGE_HASH: u32 = 577;
pub const ERROR_DLL_INIT_FAILED: u32 = 1114;
pub const ERROR_NOT_FOUND: u32 = 1168;
pub const ERROR_SXS_CANT_GEN_ACTCTX: u32 = 14001;

const NT_STATUS_MAP: &[(u32, u32)] = &[
    (0xC000_000D, ERROR_INVALID_PARAMETER),
    (0xC000_0017, ERROR_NOT_ENOUGH_MEMORY),
    (0xC000_0022, ERROR_ACCESS_DENIED),
    (0xC000_0034, ERROR_FILE_NOT_FOUND),
    (0xC000_003A, ERROR_PATH_NOT_FOUND),
    (0xC000_007B, ERROR_BAD_EXE_FORMAT),
    (0xC000_012F, ERROR_BAD_EXE_FORMAT),
    (0xC000_0135, ERROR_MOD_NOT_FOUND),
    (0xC000_0138, ERROR_INVALID_ORDINAL),
    (0xC000_0139, ERROR_PROC_NOT_FOUND),
    (0xC000_0142, ERROR_DLL_INIT_FAILED),
    (0xC000_0225, ERROR_NOT_FOUND),
    (0xC000_0428, ERROR_INVALID_IMAGE_HASH),
    (0xC015_0002, ERROR_SXS_CANT_GEN_ACTCTX),
];

const MESSAGES: &[(u32, &str)] = &[
    (ERROR_SUCCESS, "The operation completed successfully."),
    (ERROR_FILE_NOT_FOUND, "The system cannot find the file specified."),
    (ERROR_PATH_NOT_FOUND, "The system cannot find the path specified."),
    (ERROR_ACCESS_DENIED, "Access is denied."),
    (
        ERROR_NOT_ENOUGH_MEMORY,
        "Not enough memory resources are available to process this command.",
    ),
    (ERROR_INVALID_PARAMETER, "The parameter is incorrect."),
    (ERROR_MOD_NOT_FOUND, "The specified module could not be found."),
    (ERROR_PROC_NOT_FOUND, "The specified procedure could not be found."),
    (ERROR_INVALID_ORDINAL, "The operating system cannot run %1."),
    (ERROR_BAD_EXE_FORMAT, "%1 is not a valid Win32 application."),
    (
        ERROR_MR_MID_NOT_FOUND,
        "The system cannot find message text for message number 0x%1 in the message file for %2.",
    ),
    (
        ERROR_INVALID_IMAGE_HASH,
        "Windows cannot verify the digital signature for this file. A recent hardware or software change might have installed a file that is signed incorrectly or damaged, or that might be malicious software from an unknown source.",
    ),
    (
        ERROR_DLL_INIT_FAILED,
        "A dynamic link library (DLL) initialization routine failed.",
    ),
    (ERROR_NOT_FOUND, "Element not found."),
    (
        ERROR_SXS_CANT_GEN_ACTCTX,
        "The application has failed to start because its side-by-side configuration is incorrect. Please see the application event log or use the command-line sxstrace.exe tool for more detail.",
    ),
];

/// Translate an NTSTATUS into the equivalent Win32 error code
pub fn nt_status_to_win32(status: u32) -> u32 {
    // Success and informational severities are not errors
    if status >> 30 != 0b11 {
        return ERROR_SUCCESS;
    }

    // FACILITY_NTWIN32 wraps a Win32 code directly
    if status & 0x0FFF_0000 == 0x0007_0000 {
        return status & 0xFFFF;
    }

    NT_STATUS_MAP
        .iter()
        .find(|(nt, _)| *nt == status)
        .map(|(_, win32)| *win32)
        .unwrap_or(ERROR_MR_MID_NOT_FOUND)
}

/// Parse a hexadecimal NTSTATUS string with or without a `0x` prefix
pub fn parse_nt_status(text: &str) -> Option<u32> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u32::from_str_radix(digits, 16).ok()
}

/// System message text for a Win32 error code with `%1..%n` placeholders filled
pub fn format_error(code: u32, inserts: &[&str]) -> Option<String> {
    let template = MESSAGES.iter().find(|(c, _)| *c == code)?.1;

    // Substitute from the highest index down so %1 never clobbers %10
    let mut message = template.to_string();
    for (index, value) in inserts.iter().enumerate().rev() {
        message = message.replace(&format!("%{}", index + 1), value);
    }
    Some(message)
}

/// `Error {code}: {message}` in the form used by summaries
pub fn describe(code: u32, inserts: &[&str], fallback: &str) -> String {
    let message = format_error(code, inserts).unwrap_or_else(|| {
        let fallback = fallback.trim();
        if fallback.is_empty() {
            format!("Unknown error 0x{:08X}", code)
        } else {
            fallback.to_string()
        }
    });
    format!("Error {}: {}", code, message)
}
