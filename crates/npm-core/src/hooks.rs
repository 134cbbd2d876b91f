//! The boundary to the host CPU (§6.1). `npm-core` never models the
//! symbolic CPU, KLEE, or the AFL shared-memory protocol itself — it only
//! calls out through this trait.

/// Hooks the model calls *out* to. The embedder (a real symbolic-CPU host,
/// or `npm-cli`'s `MockCpu` for local replay) implements this.
pub trait CpuHooks {
    /// Ask the CPU to take interrupt `irq` (already `+16`-shifted to an
    /// exception vector). Returns whether the CPU's masking state accepted
    /// it.
    fn on_external_interrupt(&mut self, irq_vector: u32) -> bool;

    /// Query which IRQ numbers the firmware currently has enabled (NVIC
    /// ISER), used only for the Type-1 un-enabled-flag diagnosis at the
    /// fork point.
    fn on_enable_iser(&mut self) -> Vec<u32>;

    /// Ask the fuzzer harness (or a replay vector) for up to `max_len`
    /// fresh input bytes for `phaddr`.
    fn on_buffer_input(&mut self, phaddr: u32, max_len: usize) -> Vec<u8>;

    /// Read 32 bits from CPU memory at `addr`, for `MemMapped` field
    /// indirection (§4.3.2, §9).
    fn mem_read_u32(&mut self, addr: u32) -> u32;

    /// Write 32 bits to CPU memory at `addr`, for `MemMapped` field
    /// indirection.
    fn mem_write_u32(&mut self, addr: u32, value: u32);

    /// Current program counter, used to stamp diagnosis and compliance
    /// entries with the PC that produced them.
    fn current_pc(&self) -> u64;
}
