//! panic 即停机：带着诊断信息停下来，好过抱着不一致的调度器状态继续跑

#[cfg(all(target_arch = "riscv64", not(test)))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo<'_>) -> ! {
    if let Some(location) = info.location() {
        error!(
            "kernel panicked at {}:{}: {}",
            location.file(),
            location.line(),
            info.message(),
        );
    } else {
        error!("kernel panicked: {}", info.message());
    }
    sbi_rt::system_reset(sbi_rt::Shutdown, sbi_rt::SystemFailure);
    loop {
        core::hint::spin_loop();
    }
}
