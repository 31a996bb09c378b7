use serde::Serialize;

/// The five grading dimensions TeachAssist distinguishes by cell background color.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Knowledge,
    Thinking,
    Communication,
    Application,
    Other,
}

impl Category {
    // Resolves a 6-digit hex color code (no leading '#') to its category.
    // Unknown codes fall back to Knowledge rather than failing.
    pub fn from_color(color: &str) -> Category {
        match color {
            "ffffaa" => Category::Knowledge,
            "c0fea4" => Category::Thinking,
            "afafff" => Category::Communication,
            "ffd490" => Category::Application,
            "dedede" => Category::Other,
            _ => Category::Knowledge,
        }
    }
}

/// One graded item inside an assessment, e.g. the Knowledge box of a test.
#[derive(Debug, Serialize, Clone)]
pub struct Mark {
    /// The literal cell contents as displayed, e.g. "8 / 9 = 88%".
    pub raw_text: String,
    /// Weight as reported by TeachAssist; 0 means "no weight".
    pub weight_value: u32,
    /// Whole-number percentage; None when no percentage could be parsed,
    /// which is distinct from a true 0%.
    pub percentage: Option<u32>,
    pub category: Category,
    /// This mark's share of the assessment's total weight. Set once when the
    /// owning assessment is constructed; 0.0 until then, and left at 0.0 when
    /// the assessment has no usable total weight.
    #[serde(skip)]
    pub weight_fraction: f64,
}

impl Mark {
    pub fn new(raw_text: String, weight_value: u32, percentage: Option<u32>, category: Category) -> Mark {
        Mark { raw_text, weight_value, percentage, category, weight_fraction: 0.0 }
    }
}

/// One assignment or test, holding a mark per category.
#[derive(Debug, Serialize, Clone)]
pub struct Assessment {
    pub name: String,
    /// True if any mark carries a weight of zero; formative assessments are
    /// excluded from course averaging entirely.
    pub is_formative: bool,
    /// Sum of the weights of marks with a parseable percentage; None when
    /// formative.
    pub total_weight_value: Option<u32>,
    /// Weighted average over marks with a parseable percentage; None when
    /// formative or when no mark contributes.
    pub percentage: Option<f64>,
    pub marks: Vec<Mark>,
    /// This assessment's share of the course's total weight. Set once when the
    /// owning course is constructed.
    #[serde(skip)]
    pub weight_fraction_of_course: f64,
}

impl Assessment {
    // Builds the assessment bottom-up: formative flag, total weight, then the
    // marks receive their weight fractions, then the weighted average. Marks
    // must be passed in document order; the computation itself is
    // order-independent.
    pub fn new(name: String, mut marks: Vec<Mark>) -> Assessment {
        let is_formative = marks.iter().any(|m| m.weight_value == 0);

        let total_weight_value = if is_formative {
            None
        } else {
            Some(
                marks
                    .iter()
                    .filter(|m| m.percentage.is_some())
                    .map(|m| m.weight_value)
                    .sum(),
            )
        };

        // Attach: every mark gets its share of the total, guarded against a
        // zero or absent total.
        if let Some(total) = total_weight_value {
            if total > 0 {
                for mark in &mut marks {
                    mark.weight_fraction = f64::from(mark.weight_value) / f64::from(total);
                }
            }
        }

        // Marks without a percentage never enter the weighted sum.
        let contributions: Vec<f64> = marks
            .iter()
            .filter_map(|m| m.percentage.map(|p| f64::from(p) * m.weight_fraction))
            .collect();

        let percentage = if is_formative || contributions.is_empty() {
            None
        } else {
            Some(contributions.iter().sum())
        };

        Assessment {
            name,
            is_formative,
            total_weight_value,
            percentage,
            marks,
            weight_fraction_of_course: 0.0,
        }
    }
}

/// One course, as scraped from a single report page.
#[derive(Debug, Serialize, Clone)]
pub struct Course {
    pub code: String,
    /// Sum of the total weights of the summative assessments.
    #[serde(skip)]
    pub total_weight: u32,
    /// Weighted course average; None when no summative assessment contributes.
    pub average: Option<f64>,
    pub assessments: Vec<Assessment>,
}

impl Course {
    // Same shape as Assessment::new, one level up: total weight over the
    // summative assessments, attach fractions, then the weighted average.
    pub fn new(code: String, mut assessments: Vec<Assessment>) -> Course {
        let total_weight: u32 = assessments
            .iter()
            .filter(|a| !a.is_formative)
            .filter_map(|a| a.total_weight_value)
            .sum();

        if total_weight > 0 {
            for assessment in &mut assessments {
                if let Some(weight) = assessment.total_weight_value {
                    assessment.weight_fraction_of_course =
                        f64::from(weight) / f64::from(total_weight);
                }
            }
        }

        let contributions: Vec<f64> = assessments
            .iter()
            .filter(|a| !a.is_formative)
            .filter_map(|a| a.percentage.map(|p| p * a.weight_fraction_of_course))
            .collect();

        let average = if contributions.is_empty() {
            None
        } else {
            Some(contributions.iter().sum())
        };

        Course { code, total_weight, average, assessments }
    }
}
