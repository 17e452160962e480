use std::path::Path;

use console::Style;

use dwialign_core::correct::CorrectionConfig;

struct Styles {
    title: Style,
    label: Style,
    value: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_correction_summary(config: &CorrectionConfig, input: &Path, output: &Path) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("dwialign"));
    println!();
    println!(
        "  {} {}",
        s.label.apply_to("Input:    "),
        s.path.apply_to(input.display())
    );
    println!(
        "  {} {}",
        s.label.apply_to("Output:   "),
        s.path.apply_to(output.display())
    );
    println!(
        "  {} {} volume + {} slice",
        s.label.apply_to("Epochs:   "),
        s.value.apply_to(config.volume_epochs),
        s.value.apply_to(config.slice_epochs)
    );
    if config.multiband > 0 {
        println!(
            "  {} {}",
            s.label.apply_to("Multiband:"),
            s.value.apply_to(config.multiband)
        );
    } else {
        println!(
            "  {} {}",
            s.label.apply_to("Multiband:"),
            s.disabled.apply_to("off (volume groups)")
        );
    }
    match &config.shells {
        Some(shells) => println!(
            "  {} {:?}",
            s.label.apply_to("Shells:   "),
            s.value.apply_to(shells)
        ),
        None => println!(
            "  {} {}",
            s.label.apply_to("Shells:   "),
            s.value.apply_to("all")
        ),
    }
    println!(
        "  {} {:.1} SD",
        s.label.apply_to("Outliers: "),
        s.value.apply_to(config.outlier_threshold)
    );
    println!();
}
