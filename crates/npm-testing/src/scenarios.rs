//! End-to-end scenario tests, each driving [`npm_core::NlpPeripheralModel`]
//! the way a real host CPU would: through `on_read`/`on_write` and the
//! translate-block hooks, never by reaching into its internals.

use npm_core::stats::AccessDir;
use npm_core::{NlpPeripheralModel, NpmConfig};
use npm_cli::MockCpu;

use crate::fixtures::{
    RecordingHooks, ATOMICITY_CC_FILE, SINGLE_OTHER_REG_NLP, STATUS_AND_RECEIVE_NLP, UNCONDITIONAL_IRQ30_NLP,
};

/// Scenario: a bit-band write to `0x4208_009C` clears bit 7 of the plain
/// register declared at `0x4000_4004`, leaving the other bits of the word
/// untouched, through the public facade rather than the gateway directly.
#[test]
fn bit_band_write_through_facade_sets_single_bit() {
    let mut model = NlpPeripheralModel::load(SINGLE_OTHER_REG_NLP, None, NpmConfig::default()).unwrap();
    let mut hooks = RecordingHooks::new();

    model.on_write(&mut hooks, 0x4000_4004, 0xFF);
    model.on_write(&mut hooks, 0x4208_009C, 0);

    let (word, _) = model.on_read(&mut hooks, 0x4000_4004, 4);
    assert_eq!(word, 0x7F);
}

/// Scenario: priming the Input Feeder at the configured fork point drains
/// replay bytes into every declared data register, byte by byte, in order.
#[test]
fn fork_point_priming_feeds_replay_bytes_into_receive_register() {
    const RX_NLP: &str = "R_0x40004004_0_8\n==\n==\n==\n==\n";
    let mut config = NpmConfig::default();
    config.fork_point = 0x1000;

    let mut model = NlpPeripheralModel::load(RX_NLP, None, config).unwrap();
    let mut cpu = MockCpu::new(vec![0xAA, 0x55]);

    model.on_translate_block_start(0x1000);
    model.on_translate_block_end(&mut cpu, 0x1000, false);

    let (first, is_data) = model.on_read(&mut cpu, 0x4000_4004, 1);
    assert!(is_data);
    assert_eq!(first, 0xAA);
    let (second, _) = model.on_read(&mut cpu, 0x4000_4004, 1);
    assert_eq!(second, 0x55);
}

/// Scenario: reading the Receive register without first reading its Status
/// register records an unauthorized access (§4.7 Type 3); reading the
/// Status register in between clears the flag for the next access.
#[test]
fn unread_status_register_flags_unauthorized_data_access() {
    let mut model = NlpPeripheralModel::load(STATUS_AND_RECEIVE_NLP, None, NpmConfig::default()).unwrap();
    let mut hooks = RecordingHooks::new();

    hooks.pc = 0x100;
    model.on_read(&mut hooks, 0x4000_4004, 1);

    hooks.pc = 0x104;
    model.on_read(&mut hooks, 0x4000_4000, 4);

    hooks.pc = 0x108;
    model.on_read(&mut hooks, 0x4000_4004, 1);

    let report = model.report();
    assert_eq!(report.unauthorized_access.len(), 1);
    let entry = &report.unauthorized_access[0];
    assert_eq!(entry.phaddr, 0x4000_4004);
    assert_eq!(entry.direction, AccessDir::Read);
    assert_eq!(entry.pcs, vec![0x100]);
}

/// Scenario: an IRQ fires on firmware activity but the host never reports
/// it as NVIC-enabled by the time the run completes, so the fork-point
/// snapshot taken at completion (§3 "Type 1 supplement") flags it.
#[test]
fn irq_that_fires_without_being_enabled_is_diagnosed() {
    let mut config = NpmConfig::default();
    config.fork_point = 0x2000;
    let mut model = NlpPeripheralModel::load(UNCONDITIONAL_IRQ30_NLP, None, config).unwrap();
    let mut cpu = MockCpu::new(Vec::new());
    cpu.set_enabled_iser(Vec::new());

    model.on_write(&mut cpu, 0x4000_4008, 0x01);
    model.on_exception_exit(46);

    let crossings = npm_cli::replay::run_until_complete(&mut model, &mut cpu, 0x2000);
    assert_eq!(crossings, 3);

    let report = model.report();
    assert!(report.un_enabled_flags.iter().any(|f| f.irq == 30));
}

/// Scenario: the compliance checker replays a declared stage sequence
/// (status-bit check immediately before a Receive read) against the
/// access log and reports an atomicity violation when another firmware
/// access splits the two stages apart. The gateway never records
/// `FirmwareCondition` events on its own (symbolic condition evaluation is
/// out of scope), so this drives `npm_core::compliance` directly rather
/// than through reads and writes.
#[test]
fn non_adjacent_condition_and_read_violates_atomicity() {
    use npm_core::compliance::ComplianceState;
    use npm_core::parser::parse_cc_file;
    use npm_core::types::AccessKind;

    let sequences = parse_cc_file(ATOMICITY_CC_FILE).unwrap();
    let mut compliance = ComplianceState::new();

    compliance.record(AccessKind::FirmwareCondition, 0x4000_4000, 0x80, 0x10, None);
    compliance.record(AccessKind::FirmwareWrite, 0x4000_4008, 0, 0x14, None);
    compliance.record(AccessKind::FirmwareRead, 0x4000_4004, 0, 0x18, None);

    let violations = npm_core::compliance::check_sequences(compliance.log(), &sequences);
    assert!(!violations.is_empty());
}
