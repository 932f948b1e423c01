//! charlstm: a character-level LSTM language model trainer
use charlstm::config::{Args, Device};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let device = match args.device {
        Device::Cpu => tch::Device::Cpu,
        Device::Cuda => tch::Device::cuda_if_available(),
        #[cfg(target_arch = "aarch64")]
        Device::Mps => tch::Device::Mps,
    };

    // print a banner with charLSTM
    println!(
        r#"
        *                       *        ****  ******  *    *
  ***   *                       *       *        *     **  **
 *      * ***    ****   * **    *       *        *     * ** *
 *      **   *  *    *   *      *        ***     *     * ** *
 *      *    *  *    *   *      *           *    *     *    *
  ***   *    *   *** *   *      *****   ****     *     *    *
"#
    );

    // if not built in release mode, print a big warning
    #[cfg(debug_assertions)]
    {
        println!("WARNING: This is a debug build. It will be very slow.");
    }

    charlstm::actions::train(device, args)
}
