#![no_main]
use libfuzzer_sys::fuzz_target;
use slicealias::{MonitorConfig, MonitorContext, SafetyMode, ViewError, as_str_unchecked, of_c_string};

fuzz_target!(|data: &[u8]| {
    let ctx = MonitorContext::new(MonitorConfig::default().with_mode(SafetyMode::BestEffort));
    ctx.set_violation_handler(|v| panic!("false positive: {v}"));

    // SAFETY: `data` is never written and outlives the flush below.
    match unsafe { as_str_unchecked(&ctx, data) } {
        Ok(text) => assert_eq!(text.as_ptr(), data.as_ptr()),
        Err(ViewError::InvalidUtf8 { valid_up_to, .. }) => {
            assert!(std::str::from_utf8(&data[..valid_up_to]).is_ok());
        }
        Err(other) => panic!("unexpected error {other}"),
    }
    assert_eq!(ctx.flush_pending().violations, 0);

    let mut terminated = data.to_vec();
    terminated.push(0);
    // SAFETY: `terminated` ends with a NUL.
    let c = unsafe { of_c_string(terminated.as_ptr()) }.unwrap_or_default();
    assert_eq!(Some(c.len()), terminated.iter().position(|&b| b == 0));
});
