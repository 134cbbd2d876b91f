//! Shared worked-example NLP sources and a recording `CpuHooks` stand-in,
//! used by both the scenario tests and the property tests.

use std::collections::VecDeque;

use npm_core::CpuHooks;

/// Scenario 1 ("echo device", spec §8): a status register with a TXE bit,
/// an RX register, and a TX register whose write raises IRQ 20 while
/// TXE=1, also setting status bit 5.
pub const ECHO_NLP: &str = "S_0x40004000_0\nR_0x40004004_0_8\nT_0x40004008_0_8\n==\nW,*0x40004008,*,*,*&F,0x40004000,7,=,1:F,0x40004000,5,=,1;20\n==\n==\n==\n";

/// A single `Other`-kind register and nothing else: no rules, no flags, no
/// constraints. Used by properties that need a plain read/write surface
/// undisturbed by rule firing.
pub const SINGLE_OTHER_REG_NLP: &str = "O_0x40004004_0\n==\n==\n==\n==\n";

/// Status register plus one Receive register in the same peripheral block,
/// with no rules — just enough to exercise the DR-to-SR unauthorized-access
/// bookkeeping in isolation.
pub const STATUS_AND_RECEIVE_NLP: &str = "S_0x40004000_0\nR_0x40004004_0_8\n==\n==\n==\n==\n";

/// A rule that fires unconditionally on any write to the TX register,
/// raising IRQ 30. Used for the "un-enabled flag" diagnosis scenario: the
/// IRQ fires at least once but the host never reports it as enabled.
pub const UNCONDITIONAL_IRQ30_NLP: &str =
    "S_0x40004000_0\nT_0x40004008_0_8\n==\nW,*0x40004008,*,*,*:F,0x40004000,5,=,1;30\n==\n==\n==\n";

/// The compliance sequence from scenario 6: a status-bit condition check
/// must immediately precede a read of the receive register.
pub const ATOMICITY_CC_FILE: &str = "CC,0x40004000,7,=,1->CR,0x40004004,*\n";

/// A `CpuHooks` implementation that records every interrupt request and PC
/// query, and can be pre-loaded with a fixed enabled-IRQ set and a buffer
/// to hand back from `on_buffer_input`. Every externally-requested
/// interrupt is accepted unless told otherwise, mirroring an NVIC that
/// isn't masking anything.
pub struct RecordingHooks {
    pub pc: u64,
    pub accept_interrupts: bool,
    pub accepted_interrupts: Vec<u32>,
    pub enabled_iser: Vec<u32>,
    buffer: VecDeque<u8>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self {
            pc: 1,
            accept_interrupts: true,
            accepted_interrupts: Vec::new(),
            enabled_iser: Vec::new(),
            buffer: VecDeque::new(),
        }
    }

    /// Queues bytes to be handed out by the next `on_buffer_input` calls,
    /// in order.
    pub fn queue_input(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes.iter().copied());
    }
}

impl Default for RecordingHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuHooks for RecordingHooks {
    fn on_external_interrupt(&mut self, irq_vector: u32) -> bool {
        if self.accept_interrupts {
            self.accepted_interrupts.push(irq_vector);
        }
        self.accept_interrupts
    }

    fn on_enable_iser(&mut self) -> Vec<u32> {
        self.enabled_iser.clone()
    }

    fn on_buffer_input(&mut self, _phaddr: u32, max_len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(max_len.min(self.buffer.len()));
        for _ in 0..max_len {
            match self.buffer.pop_front() {
                Some(b) => out.push(b),
                None => break,
            }
        }
        out
    }

    fn mem_read_u32(&mut self, _addr: u32) -> u32 {
        0
    }

    fn mem_write_u32(&mut self, _addr: u32, _value: u32) {}

    fn current_pc(&self) -> u64 {
        self.pc
    }
}
