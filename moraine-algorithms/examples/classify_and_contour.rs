use anyhow::Result;
use moraine_algorithms::pipeline::{
    generate_contours, run_classification, ClassificationRequest, ContourRequest,
};
use moraine_core::containers::PointCloudBuffer;
use moraine_core::nalgebra::Point3;
use rand::Rng;

fn main() -> Result<()> {
    pretty_env_logger::init();

    // generate a synthetic survey: undulating terrain with patches of vegetation
    let mut rng = rand::thread_rng();
    let mut positions = Vec::new();
    for _ in 0..20000 {
        let x: f64 = rng.gen_range(0.0..100.0);
        let y: f64 = rng.gen_range(0.0..100.0);
        let terrain = 200.0 + 3.0 * (x * 0.05).sin() + 2.0 * (y * 0.04).cos();
        positions.push(Point3::new(x, y, terrain));
        // one in four terrain samples carries a canopy return above it
        if rng.gen_range(0..4) == 0 {
            let canopy = terrain + rng.gen_range(3.0..18.0);
            positions.push(Point3::new(x, y + 0.01, canopy));
        }
    }
    let mut buffer = PointCloudBuffer::from_positions(positions);
    println!("generated {} points", buffer.len());

    let outcome = run_classification(&mut buffer, &ClassificationRequest::default())?;
    println!(
        "classified: {} ground samples, per-class counts {:?}",
        outcome.heights.ground_samples, outcome.class_histogram
    );

    let request = ContourRequest {
        classes: [2u8, 3, 4, 5].iter().copied().collect(),
        grid_spacing: 2.0,
        line_width: 1.5,
        ..ContourRequest::default()
    };
    let contour_set = generate_contours(&buffer, &request)?;
    println!("traced {} contours", contour_set.contours.len());
    for (class, reason) in &contour_set.skipped {
        println!("class {} skipped: {}", class, reason);
    }
    for contour in contour_set.contours.iter().take(5) {
        println!(
            "class {} ({}) level {}: {} vertices, closed: {}",
            contour.class,
            contour.style.label,
            contour.level,
            contour.vertices.len(),
            contour.closed
        );
    }
    Ok(())
}
