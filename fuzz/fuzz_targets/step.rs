#![no_main]

use libfuzzer_sys::fuzz_target;
use stubscope::{Abi, Driver, DriverConfig, ExecutionContext, X86Machine};

fuzz_target!(|data: &[u8]| {
    let Some((selector, code)) = data.split_first() else {
        return;
    };
    let abi = if selector & 1 == 0 {
        Abi::SysVAmd64
    } else {
        Abi::SysVI386
    };

    let mut machine = X86Machine::new(abi.architecture());
    let _ = machine.set_memory(0x1000, code);
    let _ = machine.set_register(abi.architecture().stack_pointer(), 0x8000);

    let driver = Driver::new(DriverConfig::default().with_max_steps(4096));
    let _ = driver.call(&mut machine, abi, 0x1000, &[0x2000, 0x3000, 16]);
});
