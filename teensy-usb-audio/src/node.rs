use crate::block::{AudioBlockMut, AudioBlockRef};

/// A participant in the block-rate audio update cycle.
///
/// Once per audio block period the graph pulls blocks from each node's inputs
/// and collects the blocks it pushes to its outputs. The USB endpoints join
/// the cycle through this trait: the receive side is a source (outputs only)
/// and the transmit side is a sink (inputs only).
pub trait AudioNode {
    /// Number of input ports.
    const NUM_INPUTS: usize;

    /// Number of output ports.
    const NUM_OUTPUTS: usize;

    /// Run one update period.
    ///
    /// `inputs` holds `NUM_INPUTS` shared blocks; `None` means that port is
    /// silent this period. `outputs` holds `NUM_OUTPUTS` slots. A node may
    /// replace or clear any slot; whatever is left there is what it pushes
    /// downstream.
    fn update(
        &mut self,
        inputs: &[Option<AudioBlockRef>],
        outputs: &mut [Option<AudioBlockMut>],
    );
}
