use super::feature::Feature;
use super::schema::FeatureSchema;
use crate::error::{GpkgError, Result};
use crate::ogc_sql::quote_identifier;
use crate::value::Value;

/// Attribute filter for readers, modifying writers and filtered adds.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Filter {
    /// Matches every feature.
    #[default]
    Include,
    /// Matches nothing.
    Exclude,
    /// Features whose primary key is in the list.
    Ids(Vec<i64>),
    /// Features whose attribute equals the value. `Value::Null` matches `NULL`.
    Equals(String, Value),
    /// All sub-filters match. Empty means `Include`.
    And(Vec<Filter>),
}

impl Filter {
    pub fn ids(ids: impl IntoIterator<Item = i64>) -> Self {
        Filter::Ids(ids.into_iter().collect())
    }

    pub fn equals(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Equals(name.into(), value.into())
    }

    /// Evaluate against an in-memory feature.
    pub fn matches(&self, feature: &Feature) -> bool {
        match self {
            Filter::Include => true,
            Filter::Exclude => false,
            Filter::Ids(ids) => feature.id().is_some_and(|id| ids.contains(&id)),
            Filter::Equals(name, expected) => feature
                .get(name)
                .is_some_and(|actual| values_equal(actual, expected)),
            Filter::And(filters) => filters.iter().all(|f| f.matches(feature)),
        }
    }

    /// Render as an SQL predicate whose placeholders start at `?{first_param}`.
    pub(crate) fn to_sql(
        &self,
        schema: &FeatureSchema,
        primary_key: &str,
        first_param: usize,
    ) -> Result<(String, Vec<Value>)> {
        let mut params = Vec::new();
        let predicate = self.render(schema, primary_key, first_param, &mut params)?;
        Ok((predicate, params))
    }

    fn render(
        &self,
        schema: &FeatureSchema,
        primary_key: &str,
        first_param: usize,
        params: &mut Vec<Value>,
    ) -> Result<String> {
        Ok(match self {
            Filter::Include => "1".to_string(),
            Filter::Exclude => "0".to_string(),
            Filter::Ids(ids) if ids.is_empty() => "0".to_string(),
            Filter::Ids(ids) => {
                let placeholders: Vec<String> = ids
                    .iter()
                    .map(|id| {
                        params.push(Value::Integer(*id));
                        format!("?{}", first_param + params.len() - 1)
                    })
                    .collect();
                format!(
                    "{} IN ({})",
                    quote_identifier(primary_key),
                    placeholders.join(", ")
                )
            }
            Filter::Equals(name, value) => {
                let column = schema.column(name).ok_or_else(|| {
                    GpkgError::invalid(format!("cannot filter on unknown attribute '{name}'"))
                })?;
                if column.column_type.is_geometry() {
                    return Err(GpkgError::invalid(format!(
                        "cannot filter on geometry attribute '{name}'"
                    )));
                }
                if value.is_null() {
                    format!("{} IS NULL", quote_identifier(name))
                } else {
                    params.push(value.clone());
                    format!(
                        "{} = ?{}",
                        quote_identifier(name),
                        first_param + params.len() - 1
                    )
                }
            }
            Filter::And(filters) if filters.is_empty() => "1".to_string(),
            Filter::And(filters) => {
                let parts = filters
                    .iter()
                    .map(|f| {
                        f.render(schema, primary_key, first_param, params)
                            .map(|p| format!("({p})"))
                    })
                    .collect::<Result<Vec<String>>>()?;
                parts.join(" AND ")
            }
        })
    }
}

// Same comparison as SQL `=`: integers and reals compare by numeric value.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(i), Value::Real(r)) | (Value::Real(r), Value::Integer(i)) => {
            *i as f64 == *r
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::Filter;
    use crate::feature::Feature;
    use std::sync::Arc;
    use crate::Result;
    use crate::feature::FeatureSchema;
    use crate::types::{ColumnType, GeometryType};
    use crate::value::Value;

    fn schema() -> Result<FeatureSchema> {
        FeatureSchema::builder("stations")
            .geometry("geom", GeometryType::Point)
            .column("name", ColumnType::Varchar)
            .column("rank", ColumnType::Integer)
            .build()
    }

    #[test]
    fn renders_numbered_placeholders() -> Result<()> {
        let schema = schema()?;
        let filter = Filter::And(vec![
            Filter::ids([4, 9]),
            Filter::equals("name", "A"),
            Filter::equals("rank", Value::Null),
        ]);
        let (sql, params) = filter.to_sql(&schema, "fid", 3)?;
        assert_eq!(
            sql,
            r#"("fid" IN (?3, ?4)) AND ("name" = ?5) AND ("rank" IS NULL)"#
        );
        assert_eq!(
            params,
            vec![Value::Integer(4), Value::Integer(9), Value::from("A")]
        );
        Ok(())
    }

    #[test]
    fn rejects_unknown_and_geometry_attributes() -> Result<()> {
        let schema = schema()?;
        assert!(Filter::equals("missing", 1).to_sql(&schema, "fid", 1).is_err());
        assert!(Filter::equals("geom", 1).to_sql(&schema, "fid", 1).is_err());
        assert_eq!(Filter::Ids(Vec::new()).to_sql(&schema, "fid", 1)?.0, "0");
        Ok(())
    }

    #[test]
    fn in_memory_equality_is_numeric() -> Result<()> {
        let schema = Arc::new(schema()?);
        let mut feature = Feature::new(schema);
        feature.set("rank", 1_i64)?;
        feature.set("name", "1")?;

        assert!(Filter::equals("rank", 1.0).matches(&feature));
        assert!(Filter::equals("rank", 1).matches(&feature));
        assert!(!Filter::equals("rank", 1.5).matches(&feature));
        assert!(!Filter::equals("name", 1).matches(&feature));
        Ok(())
    }
}
