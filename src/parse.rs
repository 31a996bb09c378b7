use log::error;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use crate::models::{Assessment, Category, Course, Mark};

/// A required structural node is missing from a course page. Fatal for that
/// one course only; the remaining courses still parse. Missing percentages and
/// malformed weights are not errors, they fold into the ungraded defaults.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("course heading not found")]
    MissingCourseCode,
    #[error("assessment table not found")]
    MissingAssessmentTable,
    #[error("assessment row has no name cell")]
    MissingAssessmentName,
    #[error("mark cell has no identifier node")]
    MissingMarkNode,
    #[error("mark cell has no weight node")]
    MissingWeightNode,
}

// Parses every fetched document in order, skipping courses whose page no
// longer matches the expected layout so one bad page cannot sink the run.
pub fn parse_all(documents: &[String]) -> Vec<Course> {
    let mut courses = Vec::new();
    for document in documents {
        match parse_course(document) {
            Ok(course) => courses.push(course),
            Err(e) => error!("Skipping course document: {}", e),
        }
    }
    courses
}

// Converts one course report page into a fully aggregated Course.
pub fn parse_course(html: &str) -> Result<Course, ParseError> {
    let document = Html::parse_document(html);
    let code = course_code(&document)?;
    let table = assessment_table(&document)?;

    let tr_selector = Selector::parse("tr").unwrap();
    let mut assessments = Vec::new();
    for row in direct_rows(table) {
        // Each row is re-parsed as a standalone fragment so structural queries
        // cannot leak into sibling rows. The table wrapper keeps the parser
        // from foster-parenting the row out of the fragment.
        let fragment = Html::parse_fragment(&format!("<table>{}</table>", row.html()));
        let isolated = match fragment.select(&tr_selector).next() {
            Some(r) => r,
            None => continue,
        };
        if is_header_or_spacer(isolated) {
            continue;
        }
        assessments.push(parse_assessment(isolated)?);
    }

    Ok(Course::new(code, assessments))
}

// Converts one isolated assessment row into an Assessment. The name is the
// first table cell; every nested table inside the row is one mark cell.
// Entities in the name (e.g. &amp;) are already decoded by the HTML parser.
pub fn parse_assessment(row: ElementRef) -> Result<Assessment, ParseError> {
    let td_selector = Selector::parse("td").unwrap();
    let name_cell = row
        .select(&td_selector)
        .next()
        .ok_or(ParseError::MissingAssessmentName)?;
    let name = direct_text(name_cell).trim().to_string();

    let table_selector = Selector::parse("table").unwrap();
    let mut marks = Vec::new();
    for cell in row.select(&table_selector) {
        marks.push(parse_mark(cell)?);
    }

    Ok(Assessment::new(name, marks))
}

// Converts one mark cell into a Mark. The node carrying the id attribute
// holds the displayed contents, the weight wrapper and the category color.
pub fn parse_mark(cell: ElementRef) -> Result<Mark, ParseError> {
    let id_selector = Selector::parse("[id]").unwrap();
    let mark_node = cell
        .select(&id_selector)
        .next()
        .ok_or(ParseError::MissingMarkNode)?;
    let raw_text = direct_text(mark_node).trim().to_string();

    let font_selector = Selector::parse("font").unwrap();
    let weight_node = mark_node
        .select(&font_selector)
        .next()
        .ok_or(ParseError::MissingWeightNode)?;
    let weight_value = parse_weight(direct_text(weight_node).trim());

    let color = mark_node
        .value()
        .attr("bgcolor")
        .unwrap_or("ffffaa")
        .replace('#', "");
    let category = Category::from_color(&color);

    let percentage = parse_percentage(&raw_text);

    Ok(Mark::new(raw_text, weight_value, percentage, category))
}

// The weight string is either "weight: N" or "no weight". The 7-character
// "weight:" prefix is fixed in the page layout; a test pins that assumption.
fn parse_weight(text: &str) -> u32 {
    if text.contains('n') {
        return 0;
    }
    text.get(7..)
        .and_then(|rest| rest.trim().parse().ok())
        .unwrap_or(0)
}

// First digit run immediately followed by '%' in the displayed contents,
// e.g. "8 / 9 = 88%" -> 88. None when the mark has no percentage yet.
fn parse_percentage(raw_text: &str) -> Option<u32> {
    let re = Regex::new(r"(\d+)%").unwrap();
    re.captures(raw_text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

// The course code is the trimmed direct text of the page's first heading.
fn course_code(document: &Html) -> Result<String, ParseError> {
    let h2_selector = Selector::parse("h2").unwrap();
    let heading = document
        .select(&h2_selector)
        .next()
        .ok_or(ParseError::MissingCourseCode)?;
    Ok(direct_text(heading).trim().to_string())
}

// The assessment table sits at a fixed position in the page layout. Layout
// drift breaks exactly this query.
fn assessment_table(document: &Html) -> Result<ElementRef, ParseError> {
    let table_selector =
        Selector::parse("div > div:nth-of-type(2) > div > div > table").unwrap();
    document
        .select(&table_selector)
        .next()
        .ok_or(ParseError::MissingAssessmentTable)
}

// Direct child rows of the assessment table, in document order. The HTML
// parser may interpose a tbody between the table and its rows.
fn direct_rows(table: ElementRef) -> Vec<ElementRef> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "tbody" | "thead" | "tfoot" => rows.extend(
                child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|e| e.value().name() == "tr"),
            ),
            _ => {}
        }
    }
    rows
}

// Header and spacer rows carry a bold label, a non-breaking space, or nothing
// at all; only the remaining rows hold assessment data.
fn is_header_or_spacer(row: ElementRef) -> bool {
    let b_selector = Selector::parse("b").unwrap();
    if row.select(&b_selector).next().is_some() {
        return true;
    }
    row.text()
        .all(|t| t.chars().all(|c| c.is_whitespace() || c == '\u{a0}'))
}

// Concatenates the text nodes that are direct children of the element,
// ignoring text nested in child elements.
fn direct_text(element: ElementRef) -> String {
    let mut out = String::new();
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(&text.text);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mark_from(html: &str) -> Result<Mark, ParseError> {
        let fragment = Html::parse_fragment(html);
        let table_selector = Selector::parse("table").unwrap();
        let cell = fragment.select(&table_selector).next().unwrap();
        parse_mark(cell)
    }

    #[test]
    fn parses_a_complete_mark_cell() {
        let mark = mark_from(
            r##"<table><tr><td id="m1" bgcolor="#ffd490">8 / 9 = 88%<br>
               <font size="-2">weight: 9</font></td></tr></table>"##,
        )
        .unwrap();
        assert_eq!(mark.raw_text, "8 / 9 = 88%");
        assert_eq!(mark.weight_value, 9);
        assert_eq!(mark.percentage, Some(88));
        assert_eq!(mark.category, Category::Application);
    }

    #[test]
    fn missing_bgcolor_defaults_to_knowledge() {
        let mark = mark_from(
            r#"<table><tr><td id="m1">5 / 10 = 50%<br>
               <font>weight: 10</font></td></tr></table>"#,
        )
        .unwrap();
        assert_eq!(mark.category, Category::Knowledge);
    }

    #[test]
    fn unparseable_percentage_degrades_to_none() {
        let mark = mark_from(
            r#"<table><tr><td id="m1" bgcolor="dedede">no mark<br>
               <font>weight: 5</font></td></tr></table>"#,
        )
        .unwrap();
        assert_eq!(mark.percentage, None);
        assert_eq!(mark.weight_value, 5);
    }

    #[test]
    fn missing_identifier_node_is_a_structural_error() {
        let err = mark_from(r#"<table><tr><td>8 / 9 = 88%</td></tr></table>"#).unwrap_err();
        assert_eq!(err, ParseError::MissingMarkNode);
    }

    #[test]
    fn missing_weight_node_is_a_structural_error() {
        let err =
            mark_from(r#"<table><tr><td id="m1">8 / 9 = 88%</td></tr></table>"#).unwrap_err();
        assert_eq!(err, ParseError::MissingWeightNode);
    }

    #[test]
    fn weight_string_forms() {
        // The 7-character prefix assumption must hold for the layout in use.
        assert_eq!(&"weight: 9"[..7], "weight:");
        assert_eq!(parse_weight("weight: 9"), 9);
        assert_eq!(parse_weight("weight: 30"), 30);
        assert_eq!(parse_weight("no weight"), 0);
        // Malformed weights conservatively fall back to 0 (formative).
        assert_eq!(parse_weight("weight: x"), 0);
        assert_eq!(parse_weight(""), 0);
    }

    #[test]
    fn percentage_scan_takes_digits_before_the_percent_sign() {
        assert_eq!(parse_percentage("8 / 9 = 88%"), Some(88));
        assert_eq!(parse_percentage("100%"), Some(100));
        assert_eq!(parse_percentage("8 / 9"), None);
        assert_eq!(parse_percentage(""), None);
        assert_eq!(parse_percentage("%"), None);
    }

    #[test]
    fn assessment_name_is_entity_decoded() {
        let fragment = Html::parse_fragment(
            r#"<table><tr><td>Skills &amp; Strategies</td>
               <td><table><tr><td id="m1" bgcolor="ffffaa">9 / 10 = 90%<br>
               <font>weight: 10</font></td></tr></table></td></tr></table>"#,
        );
        let tr_selector = Selector::parse("tr").unwrap();
        let row = fragment.select(&tr_selector).next().unwrap();
        let assessment = parse_assessment(row).unwrap();
        assert_eq!(assessment.name, "Skills & Strategies");
        assert_eq!(assessment.marks.len(), 1);
        assert_eq!(assessment.percentage, Some(90.0));
    }

    #[test]
    fn header_and_spacer_rows_are_discarded() {
        let fragment = Html::parse_fragment(
            r#"<table>
                 <tr><td><b>Assignments</b></td></tr>
                 <tr><td>&nbsp;</td></tr>
                 <tr><td>   </td></tr>
                 <tr><td>Unit 1</td></tr>
               </table>"#,
        );
        let tr_selector = Selector::parse("tr").unwrap();
        let rows: Vec<_> = fragment.select(&tr_selector).collect();
        let kept: Vec<_> = rows
            .iter()
            .filter(|r| !is_header_or_spacer(**r))
            .collect();
        assert_eq!(kept.len(), 1);
        let td_selector = Selector::parse("td").unwrap();
        let name_cell = kept[0].select(&td_selector).next().unwrap();
        assert_eq!(direct_text(name_cell), "Unit 1");
    }

    #[test]
    fn document_without_heading_fails_per_course() {
        assert_eq!(
            parse_course("<html><body><p>maintenance</p></body></html>").unwrap_err(),
            ParseError::MissingCourseCode
        );
    }

    #[test]
    fn document_without_assessment_table_fails_per_course() {
        assert_eq!(
            parse_course("<html><body><h2>ICS4U1</h2></body></html>").unwrap_err(),
            ParseError::MissingAssessmentTable
        );
    }

    #[test]
    fn bad_documents_are_skipped_and_good_ones_kept() {
        let good = sample_course_html("MCR3U1-02");
        let bad = "<html><body><h2>AVI2O1</h2></body></html>".to_string();
        let courses = parse_all(&[good, bad]);
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].code, "MCR3U1-02");
    }

    #[test]
    fn assessments_preserve_document_order() {
        let course = parse_course(&sample_course_html("ENG4U1-05")).unwrap();
        let names: Vec<_> = course.assessments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Unit 1 Test", "Culminating"]);
    }

    // A minimal page in the fixed report layout: heading in the first inner
    // div, assessment table nested under the second.
    fn sample_course_html(code: &str) -> String {
        format!(
            r##"<html><body><div>
              <div><h2> {code} </h2></div>
              <div><div><div><table>
                <tr><td><b>Assignments</b></td></tr>
                <tr><td>&nbsp;</td></tr>
                <tr><td>Unit 1 Test</td>
                    <td><table><tr><td id="k1" bgcolor="#ffffaa">16 / 20 = 80%<br>
                        <font size="-2">weight: 20</font></td></tr></table></td></tr>
                <tr><td>Culminating</td>
                    <td><table><tr><td id="k2" bgcolor="#c0fea4">27 / 30 = 90%<br>
                        <font size="-2">weight: 30</font></td></tr></table></td></tr>
              </table></div></div></div>
            </div></body></html>"##
        )
    }
}
