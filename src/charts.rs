use plotters::prelude::*;
use rand::{rngs::StdRng, SeedableRng};
use std::fs;

use exportalloc::allocation_node::AllocationNode;
use exportalloc::errors::InfeasiblePolicy;
use exportalloc::logger::{sanitize_filename, Logger};
use exportalloc::orchestrator::{AllocationConfig, AllocationOrchestrator};
use exportalloc::supply::SupplyTreeGenerator;

/// Allocate a synthetic tree and chart the root and every allocated layer
pub fn generate_allocation_charts() -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all("charts")?;

    let mut root = SupplyTreeGenerator::default().generate(&mut StdRng::seed_from_u64(42))?;
    let orchestrator = AllocationOrchestrator::new(AllocationConfig {
        infeasible_policy: InfeasiblePolicy::ZeroAllocation,
        ..AllocationConfig::default()
    });
    orchestrator.allocate_tree(&mut root, 0.3, &mut Logger::new())?;

    create_allocation_chart(&root, "charts/root_allocation.png")?;
    for layer in root.children().iter().filter(|l| l.export_slots() > 0) {
        let filename = format!("charts/{}_allocation.png", sanitize_filename(layer.name()));
        create_allocation_chart(layer, &filename)?;
    }
    Ok(())
}

/// Side-by-side chart of a node's children: slots on the left, price within [floor, cap] on the right
pub fn create_allocation_chart(node: &AllocationNode, filename: &str) -> Result<(), Box<dyn std::error::Error>> {
    let children = node.children();
    if children.is_empty() {
        return Err(format!("Cannot chart '{}': node has no children", node.name()).into());
    }
    let n = children.len() as f64;
    let max_slots = children.iter().map(|c| c.export_slots()).max().unwrap_or(0).max(1);
    let max_price = children.iter().map(|c| c.price_cap()).fold(0.0, f64::max).max(1e-9);

    let root_area = BitMapBackend::new(filename, (1200, 600)).into_drawing_area();
    root_area.fill(&WHITE)?;
    let (left, right) = root_area.split_horizontally(600);

    // Slots per child
    {
        let mut chart = ChartBuilder::on(&left)
            .caption(format!("{} - Export Slots", node.name()), ("sans-serif", 25))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(0.0..n, 0u32..max_slots + max_slots / 10 + 1)?;

        chart.configure_mesh()
            .x_desc("Child (by value, descending)")
            .y_desc("Slots")
            .draw()?;

        chart.draw_series(children.iter().enumerate().map(|(i, child)| {
            Rectangle::new([(i as f64 + 0.1, 0), (i as f64 + 0.9, child.export_slots())], BLUE.filled())
        }))?;
    }

    // Prices of allocated children against their bounds
    {
        let mut chart = ChartBuilder::on(&right)
            .caption(format!("{} - CPM", node.name()), ("sans-serif", 25))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(0.0..n, 0.0..max_price * 1.1)?;

        chart.configure_mesh()
            .x_desc("Child (by value, descending)")
            .y_desc("CPM")
            .draw()?;

        let allocated = move || children.iter().enumerate().filter(|(_, c)| c.export_slots() > 0);

        chart.draw_series(allocated().map(|(i, child)| {
            Rectangle::new([(i as f64 + 0.1, 0.0), (i as f64 + 0.9, child.avg_cost_per_mille())], GREEN.filled())
        }))?
        .label("Price")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], GREEN.filled()));

        chart.draw_series(allocated().map(|(i, child)| {
            PathElement::new(vec![(i as f64 + 0.1, child.floor_price()), (i as f64 + 0.9, child.floor_price())], &RED)
        }))?
        .label("Floor")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

        chart.draw_series(allocated().map(|(i, child)| {
            PathElement::new(vec![(i as f64 + 0.1, child.price_cap()), (i as f64 + 0.9, child.price_cap())], &BLACK)
        }))?
        .label("Cap")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLACK));

        chart.configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;
    }

    root_area.present()?;
    println!("Allocation chart saved to {}", filename);
    Ok(())
}
