//! The [`SignalValue`] trait: the capability a type needs to live on a wire
//! or in a register.
//!
//! Two pieces: a bit-width oracle (`WIDTH`, defaulting to `8 * size_of` for
//! the built-in integers and 1 for `bool`) and a raw-bits view used when the
//! value is rendered into a VCD bitstring. Floats are reinterpreted bitwise.
//!
//! User types (typically fieldless enums) implement the trait by hand; the
//! declared `WIDTH` can still be overridden per signal at declaration time.

/// A value that can be carried by a simulated wire or register.
///
/// `Default` supplies the storage seed for signals declared without an
/// initial value; such signals report X until first assigned, so the seed
/// itself is never observable in trace output.
pub trait SignalValue: Copy + PartialEq + Default + 'static {
    /// Bit width of this type when viewed as a hardware signal.
    const WIDTH: u32;

    /// The raw bit pattern of this value, LSB-aligned.
    ///
    /// Bits at and above position `WIDTH` are ignored by the renderer.
    fn to_vcd_bits(&self) -> u64;
}

impl SignalValue for bool {
    const WIDTH: u32 = 1;

    fn to_vcd_bits(&self) -> u64 {
        u64::from(*self)
    }
}

macro_rules! impl_signal_value_int {
    ($($t:ty),*) => {
        $(
            impl SignalValue for $t {
                const WIDTH: u32 = (std::mem::size_of::<$t>() * 8) as u32;

                fn to_vcd_bits(&self) -> u64 {
                    *self as u64
                }
            }
        )*
    };
}

impl_signal_value_int!(u8, u16, u32, u64, i8, i16, i32, i64);

impl SignalValue for f32 {
    const WIDTH: u32 = 32;

    fn to_vcd_bits(&self) -> u64 {
        u64::from(self.to_bits())
    }
}

impl SignalValue for f64 {
    const WIDTH: u32 = 64;

    fn to_vcd_bits(&self) -> u64 {
        self.to_bits()
    }
}
