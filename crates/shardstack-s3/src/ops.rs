//! The `s3s::S3` trait implementation.
//!
//! Every handler is a thin translator: validate what the wire layer has not
//! already validated, delegate to the facade, and shape the DTOs. Anything
//! the storage core does not model answers `NotImplemented`, including
//! `DeleteObject`, whose product semantics are still unsettled upstream.

// The s3s DTO module contains dozens of types we reference; wildcard is clearer.
#[allow(clippy::wildcard_imports)]
use s3s::dto::*;
use s3s::{s3_error, S3Request, S3Response, S3Result, S3};
use tokio_util::io::ReaderStream;
use tracing::debug;

use futures::StreamExt;
use md5::{Digest, Md5};

use shardstack_fs::{ListObjectsQuery, ObjectInfo as FsObjectInfo};

use crate::error::to_s3_error;
use crate::provider::ShardStackS3;

/// Default maximum number of keys returned in a single listing response.
const DEFAULT_MAX_KEYS: i32 = 1000;

/// Convert a `chrono::DateTime<Utc>` to an s3s [`Timestamp`].
fn chrono_to_timestamp(dt: chrono::DateTime<chrono::Utc>) -> Timestamp {
    let system_time = std::time::SystemTime::UNIX_EPOCH
        + std::time::Duration::from_millis(
            u64::try_from(dt.timestamp_millis()).unwrap_or_default(),
        );
    Timestamp::from(system_time)
}

/// Quote a hex digest into ETag form.
fn quote_etag(md5_hex: &str) -> String {
    format!("\"{md5_hex}\"")
}

/// Convert a facade [`FsObjectInfo`] to an s3s listing [`Object`] DTO.
#[allow(clippy::cast_possible_wrap)]
fn to_s3_object(obj: &FsObjectInfo) -> Object {
    Object {
        checksum_algorithm: None,
        checksum_type: None,
        e_tag: obj.etag.as_deref().map(quote_etag),
        key: Some(obj.name.clone()),
        last_modified: Some(chrono_to_timestamp(obj.mod_time)),
        owner: None,
        restore_status: None,
        size: Some(obj.size as i64),
        storage_class: Some(ObjectStorageClass::from_static(ObjectStorageClass::STANDARD)),
    }
}

/// Convert common prefix strings to s3s [`CommonPrefix`] DTOs.
fn to_common_prefixes(prefixes: &[String]) -> Option<CommonPrefixList> {
    if prefixes.is_empty() {
        None
    } else {
        Some(
            prefixes
                .iter()
                .map(|p| CommonPrefix {
                    prefix: Some(p.clone()),
                })
                .collect(),
        )
    }
}

/// Grants equivalent to a canned bucket ACL.
fn acl_grants(acl: shardstack_fs::BucketAcl, owner: &Owner) -> Grants {
    let canonical_owner = Grantee {
        display_name: owner.display_name.clone(),
        email_address: None,
        id: owner.id.clone(),
        type_: Type::from_static(Type::CANONICAL_USER),
        uri: None,
    };
    let group = |uri: &str| Grantee {
        display_name: None,
        email_address: None,
        id: None,
        type_: Type::from_static(Type::GROUP),
        uri: Some(uri.to_owned()),
    };
    let grant = |grantee: Grantee, permission: &'static str| Grant {
        grantee: Some(grantee),
        permission: Some(Permission::from_static(permission)),
    };

    let all_users = "http://acs.amazonaws.com/groups/global/AllUsers";
    let auth_users = "http://acs.amazonaws.com/groups/global/AuthenticatedUsers";

    let mut grants = vec![grant(canonical_owner, Permission::FULL_CONTROL)];
    match acl {
        shardstack_fs::BucketAcl::Private => {}
        shardstack_fs::BucketAcl::PublicRead => {
            grants.push(grant(group(all_users), Permission::READ));
        }
        shardstack_fs::BucketAcl::PublicReadWrite => {
            grants.push(grant(group(all_users), Permission::READ));
            grants.push(grant(group(all_users), Permission::WRITE));
        }
        shardstack_fs::BucketAcl::AuthenticatedRead => {
            grants.push(grant(group(auth_users), Permission::READ));
        }
    }
    grants
}

fn default_owner() -> Owner {
    Owner {
        display_name: Some("shardstack".to_owned()),
        id: Some("shardstack".to_owned()),
    }
}

#[async_trait::async_trait]
impl S3 for ShardStackS3 {
    // -----------------------------------------------------------------------
    // Buckets
    // -----------------------------------------------------------------------

    async fn list_buckets(
        &self,
        _req: S3Request<ListBucketsInput>,
    ) -> S3Result<S3Response<ListBucketsOutput>> {
        let buckets = self.fs.list_buckets().await.map_err(to_s3_error)?;

        let buckets: Vec<Bucket> = buckets
            .into_iter()
            .map(|b| Bucket {
                bucket_region: None,
                creation_date: Some(chrono_to_timestamp(b.created)),
                name: Some(b.name),
            })
            .collect();

        let output = ListBucketsOutput {
            buckets: Some(buckets),
            continuation_token: None,
            owner: Some(default_owner()),
            prefix: None,
        };
        Ok(S3Response::new(output))
    }

    async fn create_bucket(
        &self,
        req: S3Request<CreateBucketInput>,
    ) -> S3Result<S3Response<CreateBucketOutput>> {
        let bucket = req.input.bucket;
        self.fs.make_bucket(&bucket).await.map_err(to_s3_error)?;

        if let Some(acl) = req.input.acl {
            self.fs
                .set_bucket_acl(&bucket, acl.as_str())
                .await
                .map_err(to_s3_error)?;
        }

        debug!(bucket = %bucket, "create_bucket completed");
        let output = CreateBucketOutput {
            location: Some(format!("/{bucket}")),
        };
        Ok(S3Response::new(output))
    }

    async fn head_bucket(
        &self,
        req: S3Request<HeadBucketInput>,
    ) -> S3Result<S3Response<HeadBucketOutput>> {
        self.fs
            .bucket_info(&req.input.bucket)
            .await
            .map_err(to_s3_error)?;

        let output = HeadBucketOutput {
            access_point_alias: None,
            bucket_location_name: None,
            bucket_location_type: None,
            bucket_region: None,
        };
        Ok(S3Response::new(output))
    }

    async fn delete_bucket(
        &self,
        req: S3Request<DeleteBucketInput>,
    ) -> S3Result<S3Response<DeleteBucketOutput>> {
        self.fs
            .delete_bucket(&req.input.bucket)
            .await
            .map_err(to_s3_error)?;
        debug!(bucket = %req.input.bucket, "delete_bucket completed");
        Ok(S3Response::new(DeleteBucketOutput {}))
    }

    async fn get_bucket_acl(
        &self,
        req: S3Request<GetBucketAclInput>,
    ) -> S3Result<S3Response<GetBucketAclOutput>> {
        let acl = self
            .fs
            .get_bucket_acl(&req.input.bucket)
            .await
            .map_err(to_s3_error)?;

        let owner = default_owner();
        let output = GetBucketAclOutput {
            grants: Some(acl_grants(acl, &owner)),
            owner: Some(owner),
        };
        Ok(S3Response::new(output))
    }

    async fn put_bucket_acl(
        &self,
        req: S3Request<PutBucketAclInput>,
    ) -> S3Result<S3Response<PutBucketAclOutput>> {
        let bucket = req.input.bucket;
        let canned = req
            .input
            .acl
            .as_ref()
            .map_or("private", BucketCannedACL::as_str);
        self.fs
            .set_bucket_acl(&bucket, canned)
            .await
            .map_err(to_s3_error)?;

        debug!(bucket = %bucket, acl = canned, "put_bucket_acl completed");
        Ok(S3Response::new(PutBucketAclOutput {}))
    }

    // -----------------------------------------------------------------------
    // Listing
    // -----------------------------------------------------------------------

    #[allow(clippy::cast_possible_wrap)]
    async fn list_objects(
        &self,
        req: S3Request<ListObjectsInput>,
    ) -> S3Result<S3Response<ListObjectsOutput>> {
        let bucket = req.input.bucket;
        let max_keys = req.input.max_keys.unwrap_or(DEFAULT_MAX_KEYS);

        let query = ListObjectsQuery {
            prefix: req.input.prefix.clone().unwrap_or_default(),
            marker: req.input.marker.clone().unwrap_or_default(),
            delimiter: req.input.delimiter.clone().unwrap_or_default(),
            max_keys: usize::try_from(max_keys).unwrap_or(0),
        };
        let result = self
            .fs
            .list_objects(&bucket, query)
            .await
            .map_err(to_s3_error)?;

        let contents: Vec<Object> = result.objects.iter().map(to_s3_object).collect();
        let common_prefixes = to_common_prefixes(&result.prefixes);

        debug!(
            bucket = %bucket,
            count = contents.len(),
            is_truncated = result.is_truncated,
            "list_objects completed"
        );

        let output = ListObjectsOutput {
            common_prefixes,
            contents: if contents.is_empty() {
                None
            } else {
                Some(contents)
            },
            delimiter: req.input.delimiter,
            encoding_type: req.input.encoding_type,
            is_truncated: Some(result.is_truncated),
            marker: req.input.marker,
            max_keys: Some(max_keys),
            name: Some(bucket),
            next_marker: result.next_marker,
            prefix: req.input.prefix,
            request_charged: None,
        };
        Ok(S3Response::new(output))
    }

    // -----------------------------------------------------------------------
    // Objects
    // -----------------------------------------------------------------------

    #[allow(clippy::cast_possible_wrap)]
    async fn get_object(
        &self,
        req: S3Request<GetObjectInput>,
    ) -> S3Result<S3Response<GetObjectOutput>> {
        if req.input.range.is_some() {
            // The storage contract is a whole-object stream.
            return Err(s3_error!(NotImplemented, "range reads are not supported"));
        }

        let (info, reader) = self
            .fs
            .get_object(&req.input.bucket, &req.input.key, 0)
            .await
            .map_err(to_s3_error)?;

        debug!(bucket = %req.input.bucket, key = %req.input.key, size = info.size, "get_object streaming");

        let body = StreamingBlob::wrap(ReaderStream::new(reader));
        let output = GetObjectOutput {
            body: Some(body),
            content_length: Some(info.size as i64),
            e_tag: info.etag.as_deref().map(quote_etag),
            last_modified: Some(chrono_to_timestamp(info.mod_time)),
            ..Default::default()
        };
        Ok(S3Response::new(output))
    }

    #[allow(clippy::cast_possible_wrap)]
    async fn head_object(
        &self,
        req: S3Request<HeadObjectInput>,
    ) -> S3Result<S3Response<HeadObjectOutput>> {
        let info = self
            .fs
            .stat_object(&req.input.bucket, &req.input.key)
            .await
            .map_err(to_s3_error)?;

        let output = HeadObjectOutput {
            content_length: Some(info.size as i64),
            e_tag: info.etag.as_deref().map(quote_etag),
            last_modified: Some(chrono_to_timestamp(info.mod_time)),
            ..Default::default()
        };
        Ok(S3Response::new(output))
    }

    async fn put_object(
        &self,
        req: S3Request<PutObjectInput>,
    ) -> S3Result<S3Response<PutObjectOutput>> {
        let bucket = req.input.bucket;
        let key = req.input.key;

        let Some(mut body) = req.input.body else {
            return Err(s3_error!(IncompleteBody, "missing request body"));
        };

        let mut writer = self
            .fs
            .create_object(&bucket, &key)
            .await
            .map_err(to_s3_error)?;

        let mut md5 = Md5::new();
        let mut size = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(s3_error!(IncompleteBody, "body stream failed: {e}"));
                }
            };
            md5.update(&chunk);
            size += chunk.len() as u64;
            if let Err(e) = writer.append(&chunk).await {
                let _ = writer.abort().await;
                return Err(to_s3_error(e));
            }
        }
        writer.commit().await.map_err(to_s3_error)?;

        let md5_hex = hex::encode(md5.finalize());
        debug!(bucket = %bucket, key = %key, size, "put_object completed");

        let output = PutObjectOutput {
            e_tag: Some(quote_etag(&md5_hex)),
            ..Default::default()
        };
        Ok(S3Response::new(output))
    }

    async fn delete_object(
        &self,
        _req: S3Request<DeleteObjectInput>,
    ) -> S3Result<S3Response<DeleteObjectOutput>> {
        // Upstream semantics for this handler are unsettled; refuse rather
        // than guess.
        Err(s3_error!(NotImplemented, "DeleteObject is not supported"))
    }
}
