//! Vocabulary used for the administrative partition and execution reports.

use oxigraph::model::NamedNodeRef;

/// Reserved partition holding `(partitionUri, schema:dateModified)` facts.
pub const ADMIN_PARTITION: NamedNodeRef<'static> = NamedNodeRef::new_unchecked("urn:lodharvest:admin");

pub mod rdf {
    use oxigraph::model::NamedNodeRef;

    pub const TYPE: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/1999/02/22-rdf-syntax-ns#type");
}

pub mod schema {
    use oxigraph::model::NamedNodeRef;

    pub const DATE_MODIFIED: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://schema.org/dateModified");
    pub const DATE_CREATED: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://schema.org/dateCreated");
    pub const DATA_DOWNLOAD: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://schema.org/DataDownload");
    pub const CONTENT_URL: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://schema.org/contentUrl");
    pub const ENCODING_FORMAT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://schema.org/encodingFormat");
    pub const NAME: NamedNodeRef<'static> = NamedNodeRef::new_unchecked("https://schema.org/name");
    pub const DESCRIPTION: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://schema.org/description");
}

pub mod prov {
    use oxigraph::model::NamedNodeRef;

    pub const STARTED_AT_TIME: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/prov#startedAtTime");
    pub const ENDED_AT_TIME: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/prov#endedAtTime");
}

/// Harvest report terms (`lh:`).
pub mod lh {
    use oxigraph::model::NamedNodeRef;

    pub const NAMESPACE: &str = "urn:lodharvest:vocab:";

    pub const EXECUTION_REPORT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("urn:lodharvest:vocab:ExecutionReport");
    pub const TASK_REPORT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("urn:lodharvest:vocab:TaskReport");
    pub const PATH_ASSERTION: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("urn:lodharvest:vocab:PathAssertion");
    pub const REPORT: NamedNodeRef<'static> = NamedNodeRef::new_unchecked("urn:lodharvest:vocab:report");
    pub const TASK: NamedNodeRef<'static> = NamedNodeRef::new_unchecked("urn:lodharvest:vocab:task");
    pub const TASK_INDEX: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("urn:lodharvest:vocab:taskIndex");
    pub const SUBJECT: NamedNodeRef<'static> = NamedNodeRef::new_unchecked("urn:lodharvest:vocab:subject");
    pub const PATH: NamedNodeRef<'static> = NamedNodeRef::new_unchecked("urn:lodharvest:vocab:path");
    pub const ASSERTED_DEPTH: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("urn:lodharvest:vocab:assertedDepth");
    pub const MAX_DEPTH: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("urn:lodharvest:vocab:maxDepth");
    pub const BOUNCED: NamedNodeRef<'static> = NamedNodeRef::new_unchecked("urn:lodharvest:vocab:bounced");
    pub const SUCCESS: NamedNodeRef<'static> = NamedNodeRef::new_unchecked("urn:lodharvest:vocab:success");
    pub const TRIPLE_COUNT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("urn:lodharvest:vocab:tripleCount");
    pub const RUN_PREFIX: &str = "urn:lodharvest:run:";
}
