use std::mem::size_of;

use rv32ima_term::cpustate::CpuState;
use rv32ima_term::ram::RamImage;

#[test]
fn cpu_state_lives_at_the_tail_of_ram() {
    let ram = RamImage::new(1 << 20);
    assert_eq!(ram.cpu_state_offset(), ram.len() - size_of::<CpuState>());
}

#[test]
fn dtb_offset_plus_dtb_plus_cpu_state_accounts_for_all_of_ram() {
    let ram = RamImage::new(1 << 20);
    let dtb_len = 0x1000;
    let dtb_offset = ram.dtb_offset(dtb_len);

    assert_eq!(dtb_offset + dtb_len + size_of::<CpuState>(), ram.len());
}

#[test]
fn contains_rejects_addresses_outside_the_window() {
    let ram = RamImage::new(0x1000);
    assert!(ram.contains(rv32ima_term::ram::IMAGE_OFFSET, 1));
    assert!(ram.contains(rv32ima_term::ram::IMAGE_OFFSET + 0xFFF, 1));
    assert!(!ram.contains(rv32ima_term::ram::IMAGE_OFFSET + 0x1000, 1));
    assert!(!ram.contains(rv32ima_term::ram::IMAGE_OFFSET - 1, 1));
}
